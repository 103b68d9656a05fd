mod common;

use approx::assert_relative_eq;
use nalgebra::Matrix4;
use procanim_animation_core::{ActorId, AnimError, GraphGenerator, SyncRoleKind};
use procanim_graph_core::GraphSpec;
use procanim_pose_core::AnimationSource;
use procanim_test_fixtures::node_graphs;

use common::{clip, harness, Discard, Harness};

const A: ActorId = ActorId(1);
const B: ActorId = ActorId(2);
const C: ActorId = ActorId(3);

fn root(h: &Harness, actor: ActorId) -> Matrix4<f32> {
    h.manager
        .visit_graph(actor, |g| *g.root_transform())
        .expect("visit")
}

fn role(h: &Harness, actor: ActorId) -> SyncRoleKind {
    h.manager.visit_graph(actor, |g| g.sync_role()).expect("visit")
}

fn local_time(h: &Harness, actor: ActorId) -> f32 {
    h.manager
        .visit_graph(actor, |g| g.generator().map(|g| g.local_time()))
        .expect("visit")
        .expect("generator")
}

fn animate_all(h: &Harness) {
    h.resolver.place(A, 1.0, 0.0, 0.0);
    h.resolver.place(B, 5.0, 0.0, 0.0);
    h.resolver.place(C, 9.0, 0.0, 0.0);
    for actor in [A, B, C] {
        h.manager
            .load_and_start_animation(actor, clip("idle"), 0.0)
            .expect("load");
    }
}

#[test]
fn it_should_require_two_actors() {
    let h = harness();
    assert_eq!(
        h.manager.sync_graphs(&[A]).unwrap_err(),
        AnimError::NotEnoughActors { count: 1 }
    );
    assert_eq!(
        h.manager.sync_graphs(&[]).unwrap_err(),
        AnimError::NotEnoughActors { count: 0 }
    );
    assert_eq!(
        h.manager.sync_graphs(&[A, ActorId::NONE]).unwrap_err(),
        AnimError::InvalidActor(ActorId::NONE)
    );
}

#[test]
fn it_should_share_the_owner_root_every_tick() {
    let h = harness();
    animate_all(&h);
    h.manager.update_actor(A, 0.3).expect("tick");

    let instance = h.manager.sync_graphs(&[A, B, C]).expect("sync");
    assert_eq!(instance.lock().followers, vec![B, C]);
    assert_eq!(role(&h, A), SyncRoleKind::Owner);
    assert_eq!(role(&h, B), SyncRoleKind::Follower);
    assert_eq!(root(&h, B), root(&h, A));
    // Followers snap to the owner's clip time when they join.
    assert_relative_eq!(local_time(&h, B), 0.3, epsilon = 1e-5);

    for step in 0..6 {
        h.resolver.place(A, step as f32, 2.0, 0.0);
        h.manager.update_all(1.0 / 30.0, &mut Discard);
        let owner = root(&h, A);
        assert_relative_eq!(owner[(0, 3)], step as f32);
        assert_eq!(root(&h, B), owner);
        assert_eq!(root(&h, C), owner);
        assert_relative_eq!(local_time(&h, C), local_time(&h, A), epsilon = 1e-5);
    }

    h.manager.stop_syncing(A).expect("stop");
    assert!(!instance.lock().active);
    assert_eq!(role(&h, A), SyncRoleKind::None);
    assert_eq!(role(&h, B), SyncRoleKind::None);
    assert_eq!(role(&h, C), SyncRoleKind::None);

    h.manager.update_all(1.0 / 30.0, &mut Discard);
    assert_relative_eq!(root(&h, B)[(0, 3)], 5.0);
    assert_relative_eq!(root(&h, C)[(0, 3)], 9.0);
}

#[test]
fn it_should_let_a_single_follower_leave() {
    let h = harness();
    animate_all(&h);
    let instance = h.manager.sync_graphs(&[A, B, C]).expect("sync");

    h.manager.stop_syncing(B).expect("stop");
    assert_eq!(instance.lock().followers, vec![C]);
    assert!(instance.lock().active);
    assert_eq!(role(&h, B), SyncRoleKind::None);
    assert_eq!(role(&h, C), SyncRoleKind::Follower);
}

#[test]
fn it_should_release_followers_when_the_owner_goes_away() {
    let h = harness();
    animate_all(&h);
    let instance = h.manager.sync_graphs(&[A, B]).expect("sync");

    assert!(h.manager.detach_graph(A).expect("detach"));
    assert!(!instance.lock().active);
    assert_eq!(role(&h, B), SyncRoleKind::None);
    h.manager.update_all(0.1, &mut Discard);
    assert_relative_eq!(root(&h, B)[(0, 3)], 5.0);
}

#[test]
fn it_should_regroup_with_a_new_owner() {
    let h = harness();
    animate_all(&h);
    let first = h.manager.sync_graphs(&[A, B]).expect("sync");
    let second = h.manager.sync_graphs(&[B, A]).expect("resync");

    assert!(!first.lock().active);
    assert_eq!(second.lock().owner, B);
    assert_eq!(second.lock().followers, vec![A]);
    assert_eq!(role(&h, B), SyncRoleKind::Owner);
    assert_eq!(role(&h, A), SyncRoleKind::Follower);

    h.manager.update_all(0.1, &mut Discard);
    assert_relative_eq!(root(&h, A)[(0, 3)], 5.0);
}

#[test]
fn it_should_align_node_graph_clocks() {
    let h = harness();
    let spec: GraphSpec = node_graphs::spec("layered").expect("graph fixture");
    let skeleton = h.source.skeleton("chain").expect("skeleton");
    for actor in [A, B] {
        let generator = GraphGenerator::new("layered", &spec, skeleton.clone(), h.source.clone())
            .expect("binds");
        h.manager
            .attach_generator(actor, Box::new(generator), 0.0)
            .expect("attach");
    }
    h.manager.update_actor(A, 0.7).expect("tick");

    h.manager.sync_graphs(&[A, B]).expect("sync");
    h.manager.update_all(0.05, &mut Discard);

    let owner = h.manager.visit_graph(A, |g| g.pose().to_vec()).expect("visit");
    let follower = h.manager.visit_graph(B, |g| g.pose().to_vec()).expect("visit");
    for (a, b) in owner.iter().zip(&follower) {
        assert_relative_eq!(a.translation, b.translation, epsilon = 1e-4);
    }
    assert_relative_eq!(local_time(&h, B), local_time(&h, A), epsilon = 1e-5);
}
