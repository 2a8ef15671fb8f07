//! PresenceSynchronizer / ExplorerSession integration tests
#![cfg(feature = "runtime")]

#[cfg(test)]
mod tests {
    use edge_explorer::{
        error::{ExplorerError, Result},
        footprint::{ObjectChange, ObjectDescriptor, ShapeKind},
        input::Key,
        motion::StepOutcome,
        presence::{Clock, PoseCell, PresenceSynchronizer, PublishOutcome},
        protocol::{ChangeEvent, PresenceKey, PresenceRecord},
        store::{ChangeFeed, MemoryPresenceStore, PresenceStore},
        types::{Identity, MotionConfig, Pose, PresenceConfig, Vec3, WorldId},
        ExplorerSession,
    };
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    const T0: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(ms: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(ms)))
        }

        fn set(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Counts calls and can be told to fail.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPresenceStore,
        upserts: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingStore {
        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(ExplorerError::Store("backend unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    impl PresenceStore for CountingStore {
        async fn upsert(&self, record: PresenceRecord) -> Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.upsert(record).await
        }

        async fn fetch_active(&self, world: &WorldId, since_ms: u64) -> Result<Vec<PresenceRecord>> {
            self.check()?;
            self.inner.fetch_active(world, since_ms).await
        }

        fn subscribe(&self, world: &WorldId) -> Result<ChangeFeed> {
            self.inner.subscribe(world)
        }

        async fn mark_inactive(&self, key: &PresenceKey) -> Result<()> {
            self.check()?;
            self.inner.mark_inactive(key).await
        }
    }

    fn registered(id: &str) -> Identity {
        Identity::Registered {
            id: id.into(),
            display_name: id.to_uppercase(),
        }
    }

    fn sync_for<S: PresenceStore>(
        store: Arc<S>,
        id: &str,
        clock: Arc<ManualClock>,
    ) -> PresenceSynchronizer<S> {
        PresenceSynchronizer::start(
            store,
            &registered(id),
            "island".into(),
            Some("fox".into()),
            PresenceConfig::default(),
            PoseCell::new(Pose::new(Vec3::new(1.0, 0.0, 2.0), 0.5)),
            clock,
        )
        .expect("registered identity starts presence")
    }

    fn row(id: &str, last_seen_ms: u64) -> PresenceRecord {
        PresenceRecord {
            participant_id: id.into(),
            world_id: "island".into(),
            display_name: id.into(),
            position: Vec3::new(3.0, 0.0, 4.0),
            rotation: 1.0,
            character: None,
            is_active: true,
            last_seen_ms,
        }
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    #[test]
    fn guest_session_has_no_presence() {
        let store = Arc::new(MemoryPresenceStore::default());
        let sync = PresenceSynchronizer::start(
            store,
            &Identity::Guest {
                display_name: "Visitor".into(),
            },
            "island".into(),
            None,
            PresenceConfig::default(),
            PoseCell::default(),
            ManualClock::at(T0),
        );
        assert!(sync.is_none());
    }

    // -----------------------------------------------------------------------
    // Publish path
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn second_publish_within_100ms_is_suppressed() {
        let store = Arc::new(CountingStore::default());
        let mut sync = sync_for(store.clone(), "me", ManualClock::at(T0));

        assert_eq!(sync.publish_now().await, PublishOutcome::Sent);
        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(sync.publish_now().await, PublishOutcome::Throttled);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(sync.publish_now().await, PublishOutcome::Sent);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
        assert_eq!(sync.stats().throttled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_writes_one_row_per_participant_and_world() {
        let store = Arc::new(MemoryPresenceStore::default());
        let clock = ManualClock::at(T0);
        let mut sync = sync_for(store.clone(), "me", clock.clone());

        for i in 0..5 {
            clock.set(T0 + i * 200);
            sync.publish_now().await;
            tokio::time::advance(Duration::from_millis(200)).await;
        }

        assert_eq!(store.len(), 1);
        let stored = store.get(sync.key()).unwrap();
        assert_eq!(stored.last_seen_ms, T0 + 800);
        assert_eq!(stored.position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(stored.rotation, 0.5);
        assert_eq!(stored.character.as_ref().map(|c| c.as_str()), Some("fox"));
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let store = Arc::new(CountingStore::default());
        store.fail.store(true, Ordering::SeqCst);
        let mut sync = sync_for(store.clone(), "me", ManualClock::at(T0));

        assert_eq!(sync.publish_now().await, PublishOutcome::Failed);
        sync.join().await;
        sync.leave().await;

        assert_eq!(sync.stats().failed_publishes, 1);
        assert!(sync.roster().is_empty());
        assert!(store.inner.is_empty());
    }

    // -----------------------------------------------------------------------
    // Subscribe path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn join_seeds_roster_from_live_rows_only() {
        let store = Arc::new(MemoryPresenceStore::default());
        let now = T0 + 60_000;

        store.upsert(row("fresh", now - 1_000)).await.unwrap();
        store.upsert(row("stale", now - 45_000)).await.unwrap();
        store.upsert(row("me", now)).await.unwrap();
        store.upsert(row("leaving", now)).await.unwrap();
        store
            .mark_inactive(&PresenceKey::new("leaving".into(), "island".into()))
            .await
            .unwrap();
        let mut elsewhere = row("tourist", now);
        elsewhere.world_id = "other".into();
        store.upsert(elsewhere).await.unwrap();

        let mut sync = sync_for(store, "me", ManualClock::at(now));
        let watch = sync.roster_watch();
        sync.join().await;

        let ids: Vec<_> = sync
            .roster()
            .participants()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, ["fresh"]);
        assert_eq!(watch.borrow().len(), 1);
    }

    #[tokio::test]
    async fn repeated_update_keeps_a_single_entry() {
        let store = Arc::new(MemoryPresenceStore::default());
        let mut sync = sync_for(store, "me", ManualClock::at(T0));
        let watch = sync.roster_watch();

        let mut update = row("friend", T0);
        sync.handle_event(&ChangeEvent::Insert(update.clone()));
        update.position = Vec3::new(7.0, 0.0, -1.0);
        sync.handle_event(&ChangeEvent::Update(update.clone()));
        sync.handle_event(&ChangeEvent::Update(update.clone()));

        assert_eq!(sync.roster().len(), 1);
        let entry = sync.roster().get(&"friend".into()).unwrap();
        assert_eq!(entry.pose.position, Vec3::new(7.0, 0.0, -1.0));
        assert_eq!(watch.borrow().len(), 1);
    }

    #[tokio::test]
    async fn events_for_other_worlds_are_ignored() {
        let store = Arc::new(MemoryPresenceStore::default());
        let mut sync = sync_for(store, "me", ManualClock::at(T0));

        let mut foreign = row("friend", T0);
        foreign.world_id = "elsewhere".into();
        sync.handle_event(&ChangeEvent::Insert(foreign));
        assert!(sync.roster().is_empty());
    }

    #[tokio::test]
    async fn stale_update_and_delete_remove_participants() {
        let store = Arc::new(MemoryPresenceStore::default());
        let clock = ManualClock::at(T0);
        let mut sync = sync_for(store, "me", clock.clone());

        sync.handle_event(&ChangeEvent::Insert(row("a", T0)));
        sync.handle_event(&ChangeEvent::Insert(row("b", T0)));
        assert_eq!(sync.roster().len(), 2);

        // An update that arrives already stale counts as departure.
        clock.set(T0 + 40_000);
        sync.handle_event(&ChangeEvent::Update(row("a", T0)));
        assert!(sync.roster().get(&"a".into()).is_none());

        sync.handle_event(&ChangeEvent::Delete(PresenceKey::new(
            "b".into(),
            "island".into(),
        )));
        assert!(sync.roster().is_empty());
    }

    // -----------------------------------------------------------------------
    // Staleness sweep
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sweep_evicts_after_thirty_seconds_of_silence() {
        let store = Arc::new(MemoryPresenceStore::default());
        let now = T0 + 100_000;
        let clock = ManualClock::at(now - 29_000);
        let mut sync = sync_for(store, "me", clock.clone());

        sync.handle_event(&ChangeEvent::Insert(row("old", now - 31_000)));
        sync.handle_event(&ChangeEvent::Insert(row("recent", now - 29_000)));
        assert_eq!(sync.roster().len(), 2);

        clock.set(now);
        assert_eq!(sync.sweep(), 1);
        assert!(sync.roster().get(&"old".into()).is_none());
        assert!(sync.roster().get(&"recent".into()).is_some());
        assert_eq!(sync.stats().evicted, 1);
    }

    // -----------------------------------------------------------------------
    // Full loop
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn run_publishes_every_tick_and_sweeps_silent_peers() {
        let store = Arc::new(CountingStore::default());
        let clock = ManualClock::at(T0);
        // Peer whose tab closed: a row, and then nothing.
        store.inner.upsert(row("quiet", T0)).await.unwrap();

        let sync = sync_for(store.clone(), "me", clock.clone());
        let view = sync.roster_watch();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(sync.run(async move {
            let _ = stop_rx.await;
        }));

        // Ticks at 0, 200, ..., 1000 ms.
        tokio::time::sleep(Duration::from_millis(1_010)).await;
        assert_eq!(store.upserts.load(Ordering::SeqCst), 6);
        assert_eq!(view.borrow().len(), 1);

        // No delete ever arrives; the 5 s sweep has to notice the silence.
        clock.set(T0 + 31_000);
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert!(view.borrow().is_empty());

        stop.send(()).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.publishes, 26);
        assert_eq!(stats.throttled, 0);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.roster_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_intervals_do_not_stop_the_loop() {
        let store = Arc::new(MemoryPresenceStore::default());
        let config = PresenceConfig {
            publish_interval_ms: 0,
            sweep_interval_ms: 0,
            ..Default::default()
        };
        let sync = PresenceSynchronizer::start(
            store.clone(),
            &registered("me"),
            "island".into(),
            None,
            config,
            PoseCell::default(),
            ManualClock::at(T0),
        )
        .unwrap();
        let key = sync.key().clone();

        let stats = tokio::spawn(sync.run(tokio::time::sleep(Duration::from_millis(10))))
            .await
            .unwrap();
        assert_eq!(stats.publishes, 1);
        assert!(stats.throttled > 0);
        assert!(!store.get(&key).unwrap().is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn two_participants_see_each_other_and_leave_cleanly() {
        let store = Arc::new(MemoryPresenceStore::default());
        let clock = ManualClock::at(T0);

        let alice = sync_for(store.clone(), "alice", clock.clone());
        let bob = sync_for(store.clone(), "bob", clock.clone());
        let alice_view = alice.roster_watch();
        let bob_key = bob.key().clone();

        let (stop_alice, alice_rx) = oneshot::channel::<()>();
        let (stop_bob, bob_rx) = oneshot::channel::<()>();
        let alice_task = tokio::spawn(alice.run(async move {
            let _ = alice_rx.await;
        }));
        let bob_task = tokio::spawn(bob.run(async move {
            let _ = bob_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(500)).await;
        {
            let roster = alice_view.borrow();
            assert_eq!(roster.len(), 1);
            assert_eq!(roster[0].id.as_str(), "bob");
            assert_eq!(roster[0].display_name, "BOB");
        }

        stop_bob.send(()).unwrap();
        let bob_stats = bob_task.await.unwrap();
        assert!(bob_stats.publishes >= 1);
        assert!(!store.get(&bob_key).unwrap().is_active);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(alice_view.borrow().is_empty());

        stop_alice.send(()).unwrap();
        let alice_stats = alice_task.await.unwrap();
        assert_eq!(alice_stats.roster_size, 0);
        assert_eq!(alice_stats.failed_publishes, 0);
    }

    // -----------------------------------------------------------------------
    // Session host
    // -----------------------------------------------------------------------

    fn session(identity: Identity) -> ExplorerSession<MemoryPresenceStore> {
        ExplorerSession::new(
            Arc::new(MemoryPresenceStore::default()),
            identity,
            "island".into(),
            None,
            MotionConfig::default(),
            Pose::new(Vec3::new(3.0, 0.0, 0.0), 0.0),
        )
    }

    #[tokio::test]
    async fn session_frames_read_objects_fresh_each_frame() {
        let mut s = session(registered("me"));
        let input = s.input();
        let pose_view = s.pose_watch();

        assert_eq!(s.frame(), StepOutcome::Idle);
        assert!(!pose_view.has_changed().unwrap());

        input.key_down(Key::Right);
        assert!(matches!(s.frame(), StepOutcome::Moved(_)));
        assert!(pose_view.has_changed().unwrap());

        // Drop a crate right in front of us mid-walk.
        s.apply_object_change(ObjectChange::Added(ObjectDescriptor::new(
            "crate",
            ShapeKind::Box,
            Vec3::new(4.5, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 2.0),
        )));
        let blocked_at = s.pose();
        assert!(matches!(s.frame(), StepOutcome::Blocked(_)));
        assert_eq!(s.pose().position, blocked_at.position);

        s.apply_object_change(ObjectChange::Removed { id: "crate".into() });
        assert!(matches!(s.frame(), StepOutcome::Moved(_)));
        assert_eq!(s.frames(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn session_presence_publishes_latest_frame_pose() {
        let mut s = session(registered("me"));
        let mut sync = s.presence(PresenceConfig::default(), ManualClock::at(T0)).unwrap();

        s.input().key_down(Key::Backward);
        for _ in 0..3 {
            s.frame();
        }
        assert_eq!(sync.publish_now().await, PublishOutcome::Sent);
        assert_eq!(sync.record().position, s.pose().position);
        assert!(sync.record().position.z > 0.29);
    }

    #[test]
    fn guest_session_frames_without_presence() {
        let mut s = session(Identity::Guest {
            display_name: "Visitor".into(),
        });
        assert!(s.presence(PresenceConfig::default(), ManualClock::at(T0)).is_none());
        s.input().key_down(Key::Forward);
        assert!(matches!(s.frame(), StepOutcome::Moved(_)));
    }
}
