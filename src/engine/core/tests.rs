use super::*;
use crate::config::EngineConfig;
use crate::engine::backend::{BackendCall, FailingCall, RecordingBackend};
use crate::engine::clock::{Clock, ManualClock};
use crate::engine::sound::SoundState;

const FRAME_MS: u64 = 16;

struct Harness {
    engine: SoundEngine<RecordingBackend>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let clock = ManualClock::new();
        let backend = RecordingBackend::new(clock.clone());
        let engine = SoundEngine::new(
            backend,
            SharedConfig::new(config),
            PannerSettings::default(),
        );
        Self { engine, clock }
    }

    fn frame(&mut self) {
        self.clock.advance_ms(FRAME_MS);
        self.engine.tick(self.clock.now());
    }

    /// Tick frames until `ms` of engine time have passed.
    fn run_for(&mut self, ms: u64) {
        for _ in 0..ms.div_ceil(FRAME_MS) {
            self.frame();
        }
    }

    fn emitter(&self, id: &str) -> EmitterId {
        self.engine.sound(id).unwrap().emitter()
    }

    fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }
}

fn at(x: f64, y: f64, z: f64) -> Position {
    Position::new(x, y, z)
}

// ============================================================================
// create
// ============================================================================

#[test]
fn test_create_initial_state() {
    let mut h = Harness::new();
    h.clock.advance_ms(500);
    let sound = h.engine.create("1", at(0.0, 0.0, -5.0)).unwrap();

    assert!(!sound.is_moving());
    assert!(!sound.is_beeping());
    assert_eq!(sound.last_beep_time(), 0.5);
    assert_eq!(sound.frequency(), 293.66);

    let emitter = sound.emitter();
    match &h.engine.backend().calls()[0] {
        BackendCall::Create { spec, .. } => {
            assert_eq!(spec.initial_gain, 0.0);
            assert_eq!(spec.frequency, 293.66);
            assert_eq!(spec.panner, PannerSettings::default());
        }
        other => panic!("expected create, got {:?}", other),
    }
    assert_eq!(h.engine.backend().gain_value_at(emitter, 0.5), Some(0.0));
}

#[test]
fn test_unknown_id_uses_default_frequency() {
    let mut h = Harness::new();
    let sound = h.engine.create("obj1", at(1.0, 0.0, 0.0)).unwrap();
    assert_eq!(sound.frequency(), 100.0);
}

#[test]
fn test_create_before_backend_ready_is_noop() {
    let mut h = Harness::new();
    h.engine.backend_mut().set_ready(false);

    assert!(h.engine.create("t1", at(0.0, 0.0, -5.0)).is_none());
    assert!(h.engine.is_empty());
    assert!(h.engine.backend().calls().is_empty());

    h.engine.backend_mut().set_ready(true);
    assert!(h.engine.create("t1", at(0.0, 0.0, -5.0)).is_some());
}

#[test]
fn test_duplicate_create_returns_existing() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    let first_serial = h.engine.create("t1", at(0.0, 0.0, -5.0)).unwrap().serial();

    let again = h.engine.create("t1", at(9.0, 9.0, 9.0)).unwrap();
    assert_eq!(again.serial(), first_serial);
    assert_eq!(again.position(), at(0.0, 0.0, -5.0));
    assert_eq!(h.engine.len(), 1);
    assert_eq!(h.engine.backend().live_emitters(), 1);
    assert_eq!(h.engine.stats().duplicates, 1);

    let kinds = Harness::drain_events(&mut rx);
    assert!(kinds.contains(&EngineEventKind::DuplicateCreate {
        id: "t1".to_string()
    }));
}

#[test]
fn test_create_rejects_non_finite_position() {
    let mut h = Harness::new();
    assert!(h.engine.create("t1", at(f64::NAN, 0.0, 0.0)).is_none());
    assert!(h.engine.is_empty());
}

// ============================================================================
// update_position
// ============================================================================

#[test]
fn test_update_unknown_id_is_noop() {
    let mut h = Harness::new();
    assert!(!h.engine.update_position("ghost", at(1.0, 1.0, 1.0)));
    assert!(h.engine.is_empty());
    assert!(h.engine.backend().calls().is_empty());
}

#[test]
fn test_threshold_boundary_is_stationary() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, 0.0));

    assert!(h.engine.update_position("t1", at(0.02, 0.0, 0.0)));
    assert!(!h.engine.sound("t1").unwrap().is_moving());

    assert!(h.engine.update_position("t1", at(0.02, 0.0, 0.021)));
    assert!(h.engine.sound("t1").unwrap().is_moving());
}

#[test]
fn test_single_sample_flips_motion_both_ways() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));

    h.engine.update_position("t1", at(0.5, 0.0, -5.0));
    assert!(h.engine.sound("t1").unwrap().is_moving());

    h.engine.update_position("t1", at(0.5, 0.0, -5.0));
    assert!(!h.engine.sound("t1").unwrap().is_moving());
}

#[test]
fn test_hysteresis_keeps_moving_sound_moving() {
    let config = EngineConfig {
        motion_hysteresis: 0.01,
        ..EngineConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.engine.create("t1", at(0.0, 0.0, 0.0));

    // Entering motion still needs the full threshold
    h.engine.update_position("t1", at(0.015, 0.0, 0.0));
    assert!(!h.engine.sound("t1").unwrap().is_moving());

    h.engine.update_position("t1", at(0.05, 0.0, 0.0));
    assert!(h.engine.sound("t1").unwrap().is_moving());

    // 0.015 > 0.02 - 0.01 keeps it moving
    h.engine.update_position("t1", at(0.065, 0.0, 0.0));
    assert!(h.engine.sound("t1").unwrap().is_moving());

    h.engine.update_position("t1", at(0.07, 0.0, 0.0));
    assert!(!h.engine.sound("t1").unwrap().is_moving());
}

#[test]
fn test_position_updates_are_ramped() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.clock.advance_ms(100);

    h.engine.update_position("t1", at(1.0, 2.0, -3.0));

    let x = h.engine.backend().automations(emitter, Param::PositionX);
    assert_eq!(
        x,
        vec![Automation::SetTarget {
            param: Param::PositionX,
            target: 1.0,
            start: 0.1,
            time_constant: POSITION_TIME_CONSTANT,
        }]
    );
    assert_eq!(h.engine.backend().automations(emitter, Param::PositionY).len(), 1);
    assert_eq!(h.engine.backend().automations(emitter, Param::PositionZ).len(), 1);
    assert_eq!(h.engine.sound("t1").unwrap().last_sample_time(), 0.1);
}

#[test]
fn test_update_rejects_non_finite_position() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    assert!(!h.engine.update_position("t1", at(0.0, f64::INFINITY, 0.0)));
    assert_eq!(h.engine.sound("t1").unwrap().position(), at(0.0, 0.0, -5.0));
}

// ============================================================================
// tick / beeps
// ============================================================================

#[test]
fn test_idle_beep_after_interval() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.create("t1", at(0.0, 0.0, -5.0));

    h.run_for(2_990);
    assert_eq!(h.engine.stats().beeps, 0);

    h.run_for(100);
    assert_eq!(h.engine.stats().beeps, 1);
    let beeps = Harness::drain_events(&mut rx)
        .into_iter()
        .filter(|kind| matches!(kind, EngineEventKind::BeepStarted { .. }))
        .count();
    assert_eq!(beeps, 1);
}

#[test]
fn test_beep_pulse_schedule() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.clock.advance_ms(1_000);
    h.engine.backend_mut().clear_calls();

    assert!(h.engine.trigger_beep("t1"));

    let gain = h.engine.backend().automations(emitter, Param::Gain);
    assert_eq!(
        gain,
        vec![
            Automation::CancelAndHold {
                param: Param::Gain,
                at: 1.0
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: 1.0,
                end_time: 1.0 + BEEP_ATTACK
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: 1.0,
                end_time: 1.0 + 0.1
            },
            Automation::LinearRampTo {
                param: Param::Gain,
                value: 0.0,
                end_time: 1.0 + 0.1 + BEEP_RELEASE
            },
        ]
    );

    let backend = h.engine.backend();
    assert_eq!(backend.gain_value_at(emitter, 1.0), Some(0.0));
    assert!((backend.gain_value_at(emitter, 1.05).unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(backend.gain_value_at(emitter, 1.2), Some(0.0));
}

#[test]
fn test_beep_not_retriggered_until_cleared() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let mut rx = h.engine.subscribe_events();

    assert!(h.engine.trigger_beep("t1"));
    assert!(!h.engine.trigger_beep("t1"));
    assert!(h.engine.sound("t1").unwrap().is_beeping());

    // Still beeping at exactly the beep duration
    h.clock.advance_ms(100);
    h.engine.tick(h.clock.now());
    assert!(h.engine.sound("t1").unwrap().is_beeping());
    assert!(!h.engine.trigger_beep("t1"));

    // Cleared once duration + margin has passed
    h.clock.advance_ms(21);
    h.engine.tick(h.clock.now());
    let sound = h.engine.sound("t1").unwrap();
    assert!(!sound.is_beeping());
    assert_eq!(sound.state(), SoundState::StationarySilent);

    let kinds = Harness::drain_events(&mut rx);
    assert_eq!(
        kinds,
        vec![
            EngineEventKind::BeepStarted {
                id: "t1".to_string()
            },
            EngineEventKind::BeepEnded {
                id: "t1".to_string()
            },
        ]
    );
}

#[test]
fn test_silence_ramp_skipped_while_beeping() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.frame();
    h.engine.trigger_beep("t1");
    h.engine.backend_mut().clear_calls();

    h.run_for(96);
    assert!(h.engine.backend().automations(emitter, Param::Gain).is_empty());

    h.run_for(64);
    let gain = h.engine.backend().automations(emitter, Param::Gain);
    assert!(gain.iter().any(|a| matches!(
        a,
        Automation::SetTarget { target, .. } if *target == 0.0
    )));
}

#[test]
fn test_tick_anchors_beep_on_given_time() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");

    // Backend clock stays at 0; the frame time is what counts
    h.engine.tick(3.5);
    assert_eq!(h.engine.stats().beeps, 1);
    assert_eq!(h.engine.sound("t1").unwrap().last_beep_time(), 3.5);
    let gain = h.engine.backend().automations(emitter, Param::Gain);
    assert_eq!(
        gain[gain.len() - 4],
        Automation::CancelAndHold {
            param: Param::Gain,
            at: 3.5
        }
    );

    h.engine.tick(3.6);
    assert!(h.engine.sound("t1").unwrap().is_beeping());
    h.engine.tick(3.621);
    assert!(!h.engine.sound("t1").unwrap().is_beeping());

    h.engine.tick(6.4);
    assert_eq!(h.engine.stats().beeps, 1);
    h.engine.tick(6.6);
    assert_eq!(h.engine.stats().beeps, 2);
}

#[test]
fn test_beep_is_noop_for_unknown_id() {
    let mut h = Harness::new();
    assert!(!h.engine.trigger_beep("nobody"));
    assert!(h.engine.is_empty());
    assert_eq!(h.engine.pending_tasks(), 0);
}

#[test]
fn test_no_beep_while_moving() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));

    let mut x = 0.0;
    for _ in 0..300 {
        x += 0.05;
        h.engine.update_position("t1", at(x, 0.0, -5.0));
        h.frame();
    }
    assert!(h.engine.sound("t1").unwrap().is_moving());
    assert_eq!(h.engine.stats().beeps, 0);
    assert!(!h.engine.trigger_beep("t1"));
}

#[test]
fn test_motion_resets_idle_timer() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));

    // Idle for most of the interval, then a single moving sample
    h.run_for(2_900);
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    let moved_at = h.clock.now();
    assert_eq!(h.engine.sound("t1").unwrap().last_beep_time(), moved_at);

    // Stationary again right away: no instant beep
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.run_for(1_000);
    assert_eq!(h.engine.stats().beeps, 0);

    h.run_for(2_100);
    assert_eq!(h.engine.stats().beeps, 1);
}

#[test]
fn test_moving_ramps_to_base_volume() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.frame();

    let gain = h.engine.backend().automations(emitter, Param::Gain);
    assert!(matches!(
        gain.last(),
        Some(Automation::SetTarget { target, time_constant, .. })
            if *target == 1.0 && *time_constant == GAIN_TIME_CONSTANT
    ));
    let settled = h.engine.backend().gain_value_at(emitter, h.clock.now() + 1.0);
    assert!((settled.unwrap() - 1.0).abs() < 1e-4);
}

#[test]
fn test_gain_ramp_issued_only_on_target_change() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");

    h.run_for(160);
    let after_idle = h.engine.backend().automations(emitter, Param::Gain).len();
    assert_eq!(after_idle, 2, "cancel + one silence ramp");

    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.run_for(160);
    let after_motion = h.engine.backend().automations(emitter, Param::Gain).len();
    assert_eq!(after_motion, 4);
}

#[test]
fn test_live_config_changes_take_effect_next_tick() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));

    h.engine.update_beep_interval("500").unwrap();
    h.engine.update_beep_duration("50").unwrap();
    h.run_for(520);
    assert_eq!(h.engine.stats().beeps, 1);

    h.engine.update_threshold("2").unwrap();
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    assert!(!h.engine.sound("t1").unwrap().is_moving());

    assert!(h.engine.update_threshold("NaN").is_err());
    assert_eq!(h.engine.config().snapshot().motion_threshold, 2.0);
}

#[test]
fn test_base_volume_applies_to_beeps() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.set_base_volume(0.25).unwrap();

    h.engine.trigger_beep("t1");
    let peak = h.engine.backend().gain_value_at(emitter, 0.05).unwrap();
    assert!((peak - 0.25).abs() < 1e-6);
}

// ============================================================================
// remove
// ============================================================================

#[test]
fn test_remove_fades_then_releases_after_grace() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.frame();

    assert!(h.engine.remove("t1"));
    assert!(!h.engine.contains("t1"));
    assert!(h.engine.backend().is_live(emitter));

    let gain = h.engine.backend().automations(emitter, Param::Gain);
    assert!(matches!(
        gain.last(),
        Some(Automation::SetTarget { target, time_constant, .. })
            if *target == 0.0 && *time_constant == REMOVE_TIME_CONSTANT
    ));

    h.clock.advance_ms(40);
    h.engine.tick(h.clock.now());
    assert!(h.engine.backend().is_live(emitter));

    h.clock.advance_ms(11);
    h.engine.tick(h.clock.now());
    assert!(!h.engine.backend().is_live(emitter));
    assert_eq!(h.engine.stats().released, 1);

    let calls = h.engine.backend().calls();
    let stop = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Stop { .. }))
        .unwrap();
    let release = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Release { .. }))
        .unwrap();
    assert!(stop < release);

    let kinds = Harness::drain_events(&mut rx);
    assert!(kinds.contains(&EngineEventKind::SoundRemoved {
        id: "t1".to_string()
    }));
    assert!(kinds.contains(&EngineEventKind::EmitterReleased {
        id: "t1".to_string()
    }));
}

#[test]
fn test_remove_unknown_is_noop() {
    let mut h = Harness::new();
    assert!(!h.engine.remove("ghost"));
    assert_eq!(h.engine.pending_tasks(), 0);
}

#[test]
fn test_remove_then_create_is_fresh() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.run_for(1_000);
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));
    h.engine.trigger_beep("t1");
    let old = h.engine.sound("t1").unwrap().clone();

    h.engine.remove("t1");
    h.clock.advance_ms(5);
    let fresh = h.engine.create("t1", at(2.0, 0.0, -5.0)).unwrap().clone();

    assert_ne!(fresh.serial(), old.serial());
    assert_ne!(fresh.emitter(), old.emitter());
    assert!(!fresh.is_moving());
    assert!(!fresh.is_beeping());
    assert_eq!(fresh.last_beep_time(), h.clock.now());

    // The old instance's pending beep clear must not touch the new one
    h.engine.trigger_beep("t1");
    h.clock.advance_ms(118);
    h.engine.tick(h.clock.now());
    assert!(h.engine.sound("t1").unwrap().is_beeping());

    h.run_for(50);
    assert!(!h.engine.sound("t1").unwrap().is_beeping());
    assert_eq!(h.engine.backend().live_emitters(), 1);
}

#[test]
fn test_remove_all() {
    let mut h = Harness::new();
    h.engine.create("a", at(0.0, 0.0, -1.0));
    h.engine.create("b", at(0.0, 0.0, -2.0));
    assert_eq!(h.engine.remove_all(), 2);
    assert!(h.engine.is_empty());

    h.run_for(64);
    assert_eq!(h.engine.backend().live_emitters(), 0);
}

// ============================================================================
// backend failures
// ============================================================================

fn warnings(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<String> {
    Harness::drain_events(rx)
        .into_iter()
        .filter_map(|kind| match kind {
            EngineEventKind::Warning { message } => Some(message),
            _ => None,
        })
        .collect()
}

#[test]
fn test_failed_create_tracks_nothing() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.backend_mut().fail_next(FailingCall::Create, 1);

    assert!(h.engine.create("t1", at(0.0, 0.0, -5.0)).is_none());
    assert!(h.engine.is_empty());
    assert_eq!(h.engine.stats().created, 0);
    assert_eq!(h.engine.stats().backend_errors, 1);
    assert_eq!(warnings(&mut rx).len(), 1);

    assert!(h.engine.create("t1", at(0.0, 0.0, -5.0)).is_some());
}

#[test]
fn test_failed_position_ramp_still_classifies_motion() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    h.engine.backend_mut().fail_next(FailingCall::Automate, 1);

    assert!(h.engine.update_position("t1", at(1.0, 0.0, -5.0)));
    let sound = h.engine.sound("t1").unwrap();
    assert!(sound.is_moving());
    assert_eq!(sound.position(), at(1.0, 0.0, -5.0));
    assert_eq!(h.engine.stats().backend_errors, 1);
}

#[test]
fn test_failed_gain_ramp_is_retried_next_tick() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.update_position("t1", at(1.0, 0.0, -5.0));

    h.engine.backend_mut().fail_next(FailingCall::Automate, 1);
    h.frame();
    assert_eq!(h.engine.stats().backend_errors, 1);
    assert_eq!(warnings(&mut rx).len(), 1);

    h.run_for(1_000);
    assert!(h.engine.sound("t1").unwrap().is_moving());
    let gain = h.engine.backend().gain_value_at(emitter, h.clock.now()).unwrap();
    assert!((gain - 1.0).abs() < 1e-4, "gain {gain}");
    assert_eq!(h.engine.stats().backend_errors, 1);
}

#[test]
fn test_failed_beep_pulse_still_clears() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.backend_mut().fail_next(FailingCall::Automate, 1);

    assert!(h.engine.trigger_beep("t1"));
    assert!(h.engine.sound("t1").unwrap().is_beeping());
    assert_eq!(h.engine.stats().backend_errors, 1);

    h.run_for(200);
    assert!(!h.engine.sound("t1").unwrap().is_beeping());
    assert_eq!(h.engine.backend().gain_value_at(emitter, h.clock.now()), Some(0.0));
}

#[test]
fn test_failed_release_is_retried() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.backend_mut().fail_next(FailingCall::Release, 1);

    h.engine.remove("t1");
    h.clock.advance_ms(51);
    h.engine.tick(h.clock.now());
    assert!(h.engine.backend().is_live(emitter));
    assert_eq!(h.engine.pending_tasks(), 1);

    h.clock.advance_ms(60);
    h.engine.tick(h.clock.now());
    assert!(!h.engine.backend().is_live(emitter));
    assert_eq!(h.engine.pending_tasks(), 0);
    assert_eq!(h.engine.stats().released, 1);
    assert_eq!(h.engine.stats().backend_errors, 1);

    let kinds = Harness::drain_events(&mut rx);
    assert!(kinds.contains(&EngineEventKind::EmitterReleased {
        id: "t1".to_string()
    }));
}

#[test]
fn test_failed_stop_does_not_block_release() {
    let mut h = Harness::new();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.backend_mut().fail_next(FailingCall::Stop, 1);

    h.engine.remove("t1");
    h.run_for(64);
    assert!(!h.engine.backend().is_live(emitter));
    assert_eq!(h.engine.stats().backend_errors, 1);
    assert_eq!(h.engine.pending_tasks(), 0);
}

#[test]
fn test_release_gives_up_after_max_attempts() {
    let mut h = Harness::new();
    let mut rx = h.engine.subscribe_events();
    h.engine.create("t1", at(0.0, 0.0, -5.0));
    let emitter = h.emitter("t1");
    h.engine.backend_mut().fail_next(FailingCall::Release, u32::MAX);

    h.engine.remove("t1");
    h.run_for(1_000);
    assert_eq!(h.engine.pending_tasks(), 0);
    assert!(h.engine.backend().is_live(emitter));
    assert_eq!(h.engine.stats().released, 0);
    assert_eq!(
        h.engine.stats().backend_errors,
        u64::from(MAX_RELEASE_ATTEMPTS)
    );

    let warnings = warnings(&mut rx);
    assert_eq!(warnings.len(), MAX_RELEASE_ATTEMPTS as usize + 1);
    assert!(warnings
        .last()
        .is_some_and(|message| message.contains("could not be released")));
}

#[test]
fn test_snapshot_sorted_by_id() {
    let mut h = Harness::new();
    h.engine.create("b", at(0.0, 0.0, -1.0));
    h.engine.create("a", at(0.0, 0.0, -2.0));
    let ids: Vec<String> = h.engine.snapshot().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}
