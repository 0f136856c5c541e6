// Scripted keyboard session: take off, climb, turn, fly forward and land.
// Requires a Crazyflie with a Flow deck V2, flown in an open area. Ctrl-C lands and exits.

use std::sync::Arc;
use std::time::Duration;

use flowdeck_pilot::input::keyboard::{Key, KeyEvent, KeyboardSource, CONTROLS_HELP};
use flowdeck_pilot::input::listen;
use flowdeck_pilot::link::log::{record_positions, POSITION_PERIOD};
use flowdeck_pilot::link::{param, CrazyflieLink};
use flowdeck_pilot::sink::crtp::CrtpConfig;
use flowdeck_pilot::supervisor::sensor_channel;
use flowdeck_pilot::telemetry::TelemetryRecorder;
use flowdeck_pilot::{Pilot, PilotConfig};
use futures::stream::{self, StreamExt};
use tokio::time::sleep;

const URI: &str = "radio://0/80/2M/E7E7E7E7E7";

/// Key presses and releases of the session, with the delay before each one
fn script() -> Vec<(u64, KeyEvent)> {
    vec![
        (500, KeyEvent::press(Key::Char('`'))),
        (3000, KeyEvent::press(Key::Space)),
        (500, KeyEvent::release(Key::Space)),
        (500, KeyEvent::press(Key::Right)),
        (700, KeyEvent::release(Key::Right)),
        (500, KeyEvent::press(Key::Char('-'))),
        (100, KeyEvent::press(Key::Char('w'))),
        (1500, KeyEvent::release(Key::Char('w'))),
        (1000, KeyEvent::press(Key::Char('`'))),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("{}\n", CONTROLS_HELP);

    let context = crazyflie_link::LinkContext::new();
    let mut link = CrazyflieLink::connect(context.open_link(URI).await?);

    let (sensor, monitor) = sensor_channel();
    let params = link.param().await?;
    if !param::confirm_flow_deck(&params, &sensor).await? {
        println!("No Flow deck detected, waiting for the sensor timeout");
    }

    let recorder = TelemetryRecorder::new();
    let positions = link.log().await?.start_position(POSITION_PERIOD).await?;
    let telemetry = tokio::spawn(record_positions(positions, recorder.clone()));

    let commander = link.commander(CrtpConfig::default());
    let pilot = Pilot::start(PilotConfig::default(), Arc::new(commander), monitor).await?;
    println!("Connected and armed, starting the session");

    let keys = Box::pin(stream::iter(script()).then(|(delay, key)| async move {
        sleep(Duration::from_millis(delay)).await;
        key
    }));
    let listener = tokio::spawn(listen(KeyboardSource::default(), keys, pilot.handle()));

    let exit = pilot
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    println!("Flight ended: {:?}", exit);

    if let Some(last) = recorder.trail_snapshot().last() {
        println!("Last position: ({:.2}, {:.2}, {:.2})", last.x, last.y, last.z);
    }

    listener.abort();
    telemetry.abort();
    link.disconnect().await;
    Ok(())
}
