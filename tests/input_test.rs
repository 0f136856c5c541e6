// Front ends driven through the listener loop

mod common;

use std::time::Duration;

use common::{armed, RecordingSink};
use flowdeck_pilot::input::keyboard::{Key, KeyEvent, KeyboardSource};
use flowdeck_pilot::input::panel::{default_controls, ControlPanel, WidgetEvent};
use flowdeck_pilot::input::listen;
use flowdeck_pilot::{FlightState, LoopExit, PilotConfig};
use futures::stream::{self, StreamExt};
use tokio::time::sleep;

/// Stream the events, `gap` apart
fn paced<T: Send + 'static>(
    events: Vec<T>,
    gap: Duration,
) -> std::pin::Pin<Box<dyn futures::Stream<Item = T> + Send>> {
    Box::pin(stream::iter(events).then(move |event| async move {
        sleep(gap).await;
        event
    }))
}

#[tokio::test(start_paused = true)]
async fn keyboard_session() {
    let sink = RecordingSink::new(Duration::from_millis(100));
    let (pilot, _link) = armed(PilotConfig::default(), &sink).await;

    let keys = vec![
        KeyEvent::press(Key::Char('`')),
        KeyEvent::release(Key::Char('`')),
        KeyEvent::press(Key::Char('+')),
        KeyEvent::press(Key::Space),
        KeyEvent::press(Key::Right),
        KeyEvent::release(Key::Space),
        KeyEvent::release(Key::Right),
        KeyEvent::press(Key::Char('`')),
    ];
    let listener = tokio::spawn(listen(
        KeyboardSource::default(),
        paced(keys, Duration::from_millis(50)),
        pilot.handle(),
    ));

    assert_eq!(pilot.wait().await, Ok(LoopExit::Landed));
    listener.await.unwrap().unwrap();

    let velocities = sink.velocities();
    // One speed step up: 0.40 m/s and 505 deg/s
    assert!(velocities
        .iter()
        .any(|sp| (sp.vz - 0.4).abs() < 1e-5 && sp.yaw_rate == 505.0));
    assert!(velocities.iter().all(|sp| sp.vx == 0.0 && sp.vy == 0.0));
    assert_eq!(sink.lands(), 1);
}

#[tokio::test(start_paused = true)]
async fn escape_stops_the_listener() {
    let sink = RecordingSink::new(Duration::from_millis(100));
    let (pilot, _link) = armed(PilotConfig::default(), &sink).await;
    let handle = pilot.handle();

    let keys = vec![
        KeyEvent::press(Key::Esc),
        KeyEvent::press(Key::Char('`')),
        KeyEvent::press(Key::Char('w')),
    ];
    listen(KeyboardSource::default(), paced(keys, Duration::from_millis(5)), handle.clone())
        .await
        .unwrap();

    assert_eq!(pilot.wait().await, Ok(LoopExit::Emergency));
    assert_eq!(handle.state(), FlightState::Disarmed);
    assert!(sink.velocities().is_empty());
    assert_eq!(sink.lands(), 0);
}

#[tokio::test(start_paused = true)]
async fn panel_pulse_moves_then_hovers() {
    let sink = RecordingSink::new(Duration::from_millis(100));
    let config = PilotConfig::default();
    let (pilot, _link) = armed(config.clone(), &sink).await;
    let handle = pilot.handle();
    let panel = ControlPanel::new(default_controls(&config)).unwrap();

    let click = |id: &str| WidgetEvent::Click { id: id.to_owned() };
    let widgets = vec![
        WidgetEvent::Change { id: "height".to_owned(), value: 1.0 },
        click("takeoff"),
        click("forward"),
    ];
    listen(panel, paced(widgets, Duration::from_millis(30)), handle.clone())
        .await
        .unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(handle.state(), FlightState::Flying);
    assert_eq!(handle.snapshot().intent.forward_back, 1);
    assert_eq!(handle.snapshot().takeoff_height, 1.0);

    sleep(Duration::from_millis(600)).await;
    assert!(handle.snapshot().intent.is_neutral());
    let velocities = sink.velocities();
    assert!(velocities.iter().any(|sp| sp.vx == 0.35));
    assert!(velocities.last().unwrap().is_zero());

    pilot.shutdown().await.unwrap();
    assert_eq!(sink.calls()[1], common::Call::TakeOff(1.0));
}
