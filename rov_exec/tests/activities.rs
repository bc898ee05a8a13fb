//! Concurrent activity tests, using the simulated robot and a scripted operator.

mod common;

use common::*;
use comms_if::op::PeerMsg;
use rov_lib::{
    activities::{self, Rates},
    coordinator::CoordError,
    eqpt::DriveError,
    link::{ChannelLink, LinkError},
    sim_robot::SimRobot
};

const RATES: Rates = Rates {
    sensing_rate_hz: 200.0,
    comms_rate_hz: 100.0,
    actuation_rate_hz: 100.0
};

fn run(chan: MockChannel, retry_budget: u32, log: &EventLog) -> activities::Finished {
    run_with_drive(chan, retry_budget, log, false)
}

fn run_with_drive(chan: MockChannel, retry_budget: u32, log: &EventLog, fail_drive: bool)
    -> activities::Finished
{
    let (_robot, sensors, drive) = SimRobot::new(sim_params(None));
    let mut drive = RecordingDrive::new(drive, log);
    drive.fail_drive = fail_drive;

    activities::run(
        sensors,
        drive,
        ChannelLink::new(chan, link_params(retry_budget)),
        loc(),
        nav_ctrl(),
        nav_ctrl_params().speed_limits(),
        RATES,
        false
    )
}

#[test]
fn test_run_until_terminate() {
    let log = EventLog::default();
    let mut replies = vec![goal(0.5, 0.0); 20];
    replies.push(Some(PeerMsg::Terminate));
    let chan = MockChannel::new(replies, &log);

    let finished = run(chan, 3, &log);

    assert!(finished.result.is_ok());
    assert_eq!(finished.summary.exchanges, 21);
    assert!(finished.summary.generations > 1);
    assert!(finished.summary.actuation_cycles > 0);
    assert!(finished.loc.unwrap().estimator_state().unwrap().validate().is_ok());
    assert!(finished.nav_ctrl.is_some());

    // Reports carry the generation of the estimate they were based on
    let report = finished.summary.last_report.unwrap();
    assert!(report.generation <= finished.summary.generations);

    let events = events(&log);
    let close = position(&events, |e| *e == Event::Close { ack: true }).unwrap();
    assert_eq!(events[..close].last(), Some(&Event::Stop));
    assert_eq!(last_drive_event(&events), Some(Event::Stop));
    assert!(events[close..].iter().all(|e| !matches!(e, Event::Drive(_))));
}

#[test]
fn test_stop_before_reconnect() {
    let log = EventLog::default();
    let mut replies = vec![goal(0.5, 0.0); 5];
    replies.push(None);
    replies.extend(vec![goal(0.5, 0.0); 20]);
    replies.push(Some(PeerMsg::Terminate));
    let chan = MockChannel::new(replies, &log);

    let finished = run(chan, 3, &log);
    assert!(finished.result.is_ok());
    assert_eq!(finished.summary.exchanges, 26);

    let events = events(&log);
    let lost = position(&events, |e| *e == Event::Exchange { ok: false }).unwrap();
    let reconnect = position(&events, |e| *e == Event::Reconnect { ok: true }).unwrap();

    let stop = lost + position(&events[lost..], |e| *e == Event::Stop).unwrap();
    assert!(stop < reconnect);
    assert!(events[stop..reconnect].iter().all(|e| !matches!(e, Event::Drive(_))));

    // Driving resumed after the reconnection
    assert!(events[reconnect..].iter().any(|e| matches!(e, Event::Drive(_))));
}

#[test]
fn test_retry_budget_exhausted() {
    let log = EventLog::default();
    let mut chan = MockChannel::new(vec![goal(0.5, 0.0), None], &log);
    chan.reconnects = vec![false; 10].into();

    let finished = run(chan, 2, &log);

    assert!(matches!(
        finished.result,
        Err(CoordError::Link(LinkError::BudgetExhausted { attempts: 2, .. }))
    ));

    // The final estimate survives the failure
    let loc = finished.loc.unwrap();
    assert!(loc.estimator_state().unwrap().validate().is_ok());
    assert!(finished.summary.exchanges >= 1);

    let events = events(&log);
    assert!(events.contains(&Event::Close { ack: false }));
    assert_eq!(last_drive_event(&events), Some(Event::Stop));
}

#[test]
fn test_drive_fault() {
    let log = EventLog::default();
    let mut chan = MockChannel::new(vec![], &log);
    chan.default_reply = PeerMsg::Goal { vx_ms: 0.5, vy_ms: 0.0 };

    let finished = run_with_drive(chan, 3, &log, true);

    assert!(matches!(finished.result, Err(CoordError::Drive(DriveError::CommandFailed(_)))));

    // Every activity was joined and handed its module back
    assert!(finished.loc.is_some());
    assert!(finished.nav_ctrl.is_some());

    let events = events(&log);
    assert!(events.contains(&Event::Close { ack: false }));
    assert_eq!(last_drive_event(&events), Some(Event::Stop));
}
