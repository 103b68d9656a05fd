mod common;

use procanim_animation_core::{ActorId, AnimError, GeneratorDesc, PhaseData};

use common::{clip, harness, Discard};

const A: ActorId = ActorId(1);

fn phases(names: &[&str], transition_time: f32) -> Vec<PhaseData> {
    names
        .iter()
        .map(|name| PhaseData::new(GeneratorDesc::clip(clip(name)), transition_time))
        .collect()
}

#[test]
fn it_should_walk_three_phases_then_detach() {
    let h = harness();
    h.manager
        .start_sequence(A, phases(&["idle", "wave", "step"], 0.1))
        .expect("start");
    h.manager.update_actor(A, 0.05).expect("tick");
    assert_eq!(
        h.manager
            .visit_graph(A, |g| (g.generator_name().map(str::to_string), g.sequencer().map(|s| s.current_index())))
            .expect("visit"),
        (Some("idle".to_string()), Some(0))
    );

    for (expected, index) in [("wave", 1), ("step", 2)] {
        h.manager.advance_sequence(A, false).expect("advance");
        h.manager.update_actor(A, 0.05).expect("tick");
        h.manager
            .visit_graph(A, |g| {
                assert!(g.transition().is_none(), "hard advance skips the blend");
                assert_eq!(g.generator_name(), Some(expected));
                assert_eq!(g.sequencer().map(|s| s.current_index()), Some(index));
            })
            .expect("visit");
    }

    // Past the last phase the sequence detaches and the idle graph is evicted.
    h.manager.advance_sequence(A, false).expect("advance");
    h.manager.update_actor(A, 0.05).expect("tick");
    assert!(!h.manager.contains(A));
    assert_eq!(
        h.manager.advance_sequence(A, false),
        Err(AnimError::GraphNotFound(A))
    );
}

#[test]
fn it_should_detach_the_finished_sequence() {
    let h = harness();
    h.manager.set_persistent(A, true).expect("persist");
    h.manager
        .start_sequence(A, phases(&["idle"], 0.0))
        .expect("start");
    h.manager.update_actor(A, 0.05).expect("tick");
    h.manager.advance_sequence(A, false).expect("advance");
    h.manager.update_actor(A, 0.05).expect("tick");
    h.manager
        .visit_graph(A, |g| {
            assert!(g.sequencer().is_none());
            assert!(g.generator().is_none());
        })
        .expect("visit");
    assert_eq!(
        h.manager.advance_sequence(A, false),
        Err(AnimError::NoSequencer(A))
    );

    h.manager.set_persistent(A, false).expect("persist");
    h.manager.update_all(0.05, &mut Discard);
    assert!(!h.manager.contains(A));
}

#[test]
fn it_should_blend_between_phases_on_smooth_advance() {
    let h = harness();
    h.manager
        .start_sequence(A, phases(&["idle", "wave"], 0.2))
        .expect("start");
    h.manager.update_actor(A, 0.3).expect("tick");
    h.manager.advance_sequence(A, true).expect("advance");

    h.manager
        .visit_graph(A, |g| {
            let flags = g.sequencer().map(|s| s.flags()).unwrap_or_default();
            assert!(!flags.is_empty(), "advance is applied on the next tick");
        })
        .expect("visit");

    h.manager.update_actor(A, 0.1).expect("tick");
    h.manager
        .visit_graph(A, |g| {
            let transition = g.transition().expect("blending");
            assert_eq!(transition.incoming().map(|i| i.name()), Some("wave"));
            assert_eq!(transition.outgoing().map(|o| o.name()), Some("idle"));
            assert!(g.sequencer().is_some_and(|s| s.flags().is_empty()));
        })
        .expect("visit");
}

#[test]
fn it_should_advance_after_the_requested_loops() {
    let h = harness();
    let sequence = vec![
        PhaseData::new(GeneratorDesc::clip(clip("step")), 0.0).with_loops(1),
        PhaseData::new(GeneratorDesc::clip(clip("idle")), 0.0),
    ];
    h.manager.start_sequence(A, sequence).expect("start");

    h.manager.update_actor(A, 0.3).expect("tick");
    assert_eq!(
        h.manager.visit_graph(A, |g| g.generator_name().map(str::to_string)).expect("visit"),
        Some("step".to_string())
    );
    // step is 0.5 s long: the loop completes here and the phase changes next tick.
    h.manager.update_actor(A, 0.3).expect("tick");
    h.manager.update_actor(A, 0.01).expect("tick");
    h.manager
        .visit_graph(A, |g| {
            assert_eq!(g.generator_name(), Some("idle"));
            assert_eq!(g.sequencer().map(|s| s.current_index()), Some(1));
        })
        .expect("visit");
}

#[test]
fn it_should_treat_an_empty_sequence_as_complete() {
    let h = harness();
    h.manager
        .load_and_start_animation(A, clip("idle"), 0.0)
        .expect("load");
    h.manager.start_sequence(A, Vec::new()).expect("start");
    h.manager
        .visit_graph(A, |g| {
            assert!(g.sequencer().is_none());
            assert!(g.is_idle());
        })
        .expect("visit");
}

#[test]
fn it_should_drop_the_sequence_when_a_clip_is_started() {
    let h = harness();
    h.manager
        .start_sequence(A, phases(&["idle", "wave"], 0.0))
        .expect("start");
    h.manager
        .load_and_start_animation(A, clip("step"), 0.0)
        .expect("load");
    h.manager
        .visit_graph(A, |g| {
            assert!(g.sequencer().is_none());
            assert_eq!(g.generator_name(), Some("step"));
        })
        .expect("visit");
}

#[test]
fn it_should_poll_pending_phase_clips() {
    let h = harness();
    let wave = clip("wave");
    h.source.delay(wave.clone(), 1);
    h.manager
        .start_sequence(A, phases(&["idle", "wave"], 0.0))
        .expect("start");
    h.manager.advance_sequence(A, false).expect("advance");

    // Phase change requests wave, which is still pending.
    h.manager.update_actor(A, 0.1).expect("tick");
    h.manager
        .visit_graph(A, |g| {
            assert_eq!(g.sequencer().map(|s| s.current_index()), Some(1));
            assert_eq!(g.generator_name(), Some("idle"));
            assert!(!g.is_idle());
        })
        .expect("visit");

    h.manager.update_actor(A, 0.1).expect("tick");
    assert_eq!(
        h.manager.visit_graph(A, |g| g.generator_name().map(str::to_string)).expect("visit"),
        Some("wave".to_string())
    );
}
