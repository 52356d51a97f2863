#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::*;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |v: &T| sink.borrow_mut().push(v.clone()))
    }

    fn demo_store() -> StateStore {
        StateStore::create(|b| {
            b.local_empty::<String>("a");
            b.local("b", "1".to_string());
            b.remote_empty::<String>("c", "c-token");
        })
        .unwrap()
    }

    // cells

    #[test]
    fn test_cell_get_set() {
        let cell = state(42);
        assert_eq!(cell.get(), 42);

        cell.set(100).unwrap();
        assert_eq!(cell.get(), 100);

        cell.update(|v| *v += 1).unwrap();
        assert_eq!(cell.get(), 101);
    }

    #[test]
    fn test_empty_cell_starts_without_value() {
        let cell = StateCell::<Option<String>>::empty();
        assert_eq!(cell.get(), None);
        cell.set(Some("x".into())).unwrap();
        assert_eq!(cell.get().as_deref(), Some("x"));
        cell.set(None).unwrap();
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn test_subscribe_does_not_replay_current_value() {
        let cell = state(7);
        let (seen, f) = recorder::<i32>();
        let _sub = cell.subscribe(f).unwrap();
        assert!(seen.borrow().is_empty());
        cell.set(8).unwrap();
        assert_eq!(*seen.borrow(), vec![8]);
    }

    #[test]
    fn test_subscribers_run_in_registration_order_once() {
        let cell = state(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let _a = cell
            .subscribe({
                let order = order.clone();
                move |v| order.borrow_mut().push(("a", *v))
            })
            .unwrap();
        let _b = cell
            .subscribe({
                let order = order.clone();
                move |v| order.borrow_mut().push(("b", *v))
            })
            .unwrap();

        cell.set(5).unwrap();
        assert_eq!(*order.borrow(), vec![("a", 5), ("b", 5)]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_callback() {
        let cell = state(0);
        let (a_seen, a) = recorder::<i32>();
        let (b_seen, b) = recorder::<i32>();
        let sub_a = cell.subscribe(a).unwrap();
        let sub_b = cell.subscribe(b).unwrap();

        sub_a.unsubscribe();
        sub_a.unsubscribe();
        cell.set(1).unwrap();

        assert!(a_seen.borrow().is_empty());
        assert_eq!(*b_seen.borrow(), vec![1]);
        assert!(!sub_a.is_active());
        assert!(sub_b.is_active());
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn test_update_closure_may_use_same_cell() {
        let cell = state(1);
        let other = cell.clone();
        cell.update(move |v| *v = other.get() + 1).unwrap();
        assert_eq!(cell.get(), 2);

        let (seen, f) = recorder::<i32>();
        let _sub = cell.subscribe(f).unwrap();
        let other = cell.clone();
        cell.update(move |v| {
            other.set(10).unwrap();
            *v += 5;
        })
        .unwrap();
        assert_eq!(cell.get(), 7);
        assert_eq!(*seen.borrow(), vec![10, 7]);
    }

    #[test]
    fn test_update_closing_the_cell_fails() {
        let cell = state(1);
        let other = cell.clone();
        let result = cell.update(move |v| {
            other.close();
            *v = 2;
        });
        assert_eq!(result, Err(StateError::Closed));
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn test_close_rejects_writes_and_keeps_value() {
        let cell = state("last".to_string());
        let sub = cell.subscribe(|_| {}).unwrap();

        cell.close();
        cell.close();

        assert!(cell.is_closed());
        assert!(!sub.is_active());
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(cell.set("next".into()), Err(StateError::Closed));
        assert_eq!(cell.update(|_| {}), Err(StateError::Closed));
        assert!(matches!(cell.subscribe(|_| {}), Err(StateError::Closed)));
        assert_eq!(cell.get(), "last");
    }

    #[test]
    fn test_reentrant_set_from_listener() {
        let cell = state(0);
        let _sub = cell
            .subscribe({
                let cell = cell.clone();
                move |v| {
                    if *v < 3 {
                        cell.set(v + 1).unwrap();
                    }
                }
            })
            .unwrap();

        cell.set(1).unwrap();
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let cell = state(0);
        let calls = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let sub = cell
            .subscribe({
                let calls = calls.clone();
                let slot = slot.clone();
                move |_| {
                    *calls.borrow_mut() += 1;
                    if let Some(sub) = slot.borrow().as_ref() {
                        sub.unsubscribe();
                    }
                }
            })
            .unwrap();
        *slot.borrow_mut() = Some(sub);

        cell.set(1).unwrap();
        cell.set(2).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_listener_removed_mid_fanout_is_skipped() {
        let cell = state(0);
        let (b_seen, b) = recorder::<i32>();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let _a = cell
            .subscribe({
                let victim = victim.clone();
                move |_| {
                    if let Some(sub) = victim.borrow().as_ref() {
                        sub.unsubscribe();
                    }
                }
            })
            .unwrap();
        *victim.borrow_mut() = Some(cell.subscribe(b).unwrap());

        cell.set(1).unwrap();
        assert!(b_seen.borrow().is_empty());
    }

    #[test]
    fn test_listener_added_mid_fanout_sees_next_write_only() {
        let cell = state(0);
        let late = Rc::new(RefCell::new(Vec::new()));

        let _a = cell
            .subscribe({
                let cell = cell.clone();
                let late = late.clone();
                move |v| {
                    if *v == 1 {
                        let late = late.clone();
                        let _ = cell.subscribe(move |v| late.borrow_mut().push(*v));
                    }
                }
            })
            .unwrap();

        cell.set(1).unwrap();
        assert!(late.borrow().is_empty());
        cell.set(2).unwrap();
        assert_eq!(*late.borrow(), vec![2]);
    }

    #[test]
    fn test_close_during_fanout_stops_delivery() {
        let cell = state(0);
        let (b_seen, b) = recorder::<i32>();
        let _a = cell
            .subscribe({
                let cell = cell.clone();
                move |_| cell.close()
            })
            .unwrap();
        let _b = cell.subscribe(b).unwrap();

        cell.set(1).unwrap();
        assert!(b_seen.borrow().is_empty());
        assert!(cell.is_closed());
    }

    #[test]
    fn test_readonly_cell_shares_source() {
        let cell = state(1);
        let view = cell.readonly();
        let (seen, f) = recorder::<i32>();
        let _sub = view.subscribe(f).unwrap();

        cell.set(2).unwrap();
        assert_eq!(view.get(), 2);
        assert_eq!(*seen.borrow(), vec![2]);
        assert!(!view.is_remote());
    }

    // remote cells

    #[test]
    fn test_remote_push_updates_value_and_listeners() {
        let service = Rc::new(MemoryService::new());
        let remote = RemoteCell::<Option<String>>::empty("c-token");
        let (seen, f) = recorder::<Option<String>>();
        let _sub = remote.subscribe(f).unwrap();

        remote.connect(service.clone()).unwrap();
        assert!(service.is_registered("c-token"));

        assert_eq!(service.push("c-token", Some("y".to_string())), 1);
        assert_eq!(remote.get().as_deref(), Some("y"));
        assert_eq!(*seen.borrow(), vec![Some("y".to_string())]);
    }

    #[test]
    fn test_remote_connect_twice_fails() {
        let service = Rc::new(MemoryService::new());
        let remote = RemoteCell::new("t", 0u8);
        remote.connect(service.clone()).unwrap();

        assert_eq!(
            remote.connect(service.clone()),
            Err(StateError::AlreadyConnected {
                token: "t".to_string()
            })
        );
        assert_eq!(service.registration_count("t"), 1);

        service.push("t", 1u8);
        service.push("t", 2u8);
        assert_eq!(remote.get(), 2);
    }

    #[test]
    fn test_remote_close_unregisters() {
        let service = Rc::new(MemoryService::new());
        let remote = RemoteCell::new("t", 0u8);
        remote.connect(service.clone()).unwrap();

        remote.close();
        remote.close();

        assert!(!service.is_registered("t"));
        assert!(!remote.is_connected());
        assert_eq!(service.push("t", 9u8), 0);
        assert_eq!(remote.get(), 0);
        assert_eq!(remote.connect(service), Err(StateError::Closed));
    }

    #[test]
    fn test_remote_pull_before_first_push() {
        let service = Rc::new(MemoryService::new());
        service.seed("t", 5u32);

        let remote = RemoteCell::new("t", 1u32);
        assert_eq!(remote.get(), 1);

        remote.connect(service.clone()).unwrap();
        assert_eq!(remote.get(), 5);

        service.push("t", 6u32);
        assert_eq!(remote.get(), 6);
    }

    #[test]
    fn test_remote_ignores_wrongly_typed_push() {
        let service = Rc::new(MemoryService::new());
        let remote = RemoteCell::new("t", 1u32);
        remote.connect(service.clone()).unwrap();

        service.push("t", "not a number");
        assert_eq!(remote.get(), 1);
    }

    #[test]
    fn test_remote_token_independent_of_group_key() {
        let service = Rc::new(MemoryService::new());
        let group = StateGroup::build(|b| {
            b.remote("price", "ticker/ACME", 0u32);
        })
        .unwrap();
        group.connect_service(service.clone()).unwrap();

        assert_eq!(
            group.remote_tokens(),
            vec![("price".to_string(), "ticker/ACME".to_string())]
        );
        service.push("ticker/ACME", 12u32);
        assert_eq!(group.get::<u32>("price").unwrap(), 12);
    }

    // groups

    #[test]
    fn test_group_init_is_one_shot() {
        let mut group = StateGroup::new();
        assert_eq!(group.get::<u8>("x"), Err(StateError::NotInitialized));

        group.init(|b| {
            b.local("x", 1u8);
        })
        .unwrap();
        assert!(matches!(
            group.init(|b| {
                b.local("y", 2u8);
            }),
            Err(StateError::AlreadyInitialized)
        ));
        assert_eq!(group.keys(), vec!["x".to_string()]);
    }

    #[test]
    fn test_group_rejects_duplicate_keys() {
        let result = StateGroup::build(|b| {
            b.local("x", 1u8);
            b.local("x", 2u8);
        });
        assert!(matches!(result, Err(StateError::DuplicateKey { key }) if key == "x"));
    }

    #[test]
    fn test_group_set_on_remote_key_rejected() {
        let group = StateGroup::build(|b| {
            b.local("a", 1u32);
            b.remote("c", "c-token", 0u32);
        })
        .unwrap();

        assert_eq!(
            group.set("c", 5u32),
            Err(StateError::RemoteStateImmutable {
                key: "c".to_string()
            })
        );
        assert!(matches!(
            group.cell::<u32>("c"),
            Err(StateError::RemoteStateImmutable { .. })
        ));
        group.set("a", 2u32).unwrap();
        assert_eq!(group.get::<u32>("a").unwrap(), 2);
    }

    #[test]
    fn test_group_key_and_type_errors() {
        let group = StateGroup::build(|b| {
            b.local("a", 1u32);
        })
        .unwrap();

        assert_eq!(
            group.get::<u32>("missing"),
            Err(StateError::UnknownKey {
                key: "missing".to_string()
            })
        );
        assert!(matches!(
            group.get::<String>("a"),
            Err(StateError::TypeMismatch { .. })
        ));
        assert!(matches!(
            group.remote_cell::<u32>("a"),
            Err(StateError::TypeMismatch { key, expected }) if key == "a" && expected == "u32"
        ));
    }

    #[test]
    fn test_group_handles_from_factory_are_shared() {
        let kept = Rc::new(RefCell::new(None));
        let group = StateGroup::build({
            let kept = kept.clone();
            move |b| {
                *kept.borrow_mut() = Some(b.local("n", 1i64));
            }
        })
        .unwrap();

        let handle: StateCell<i64> = kept.borrow_mut().take().unwrap();
        handle.set(9).unwrap();
        assert_eq!(group.get::<i64>("n").unwrap(), 9);
        assert!(handle.same(&group.cell::<i64>("n").unwrap()));
    }

    #[test]
    fn test_readonly_view_shares_cells() {
        let group = StateGroup::build(|b| {
            b.local("a", 1u32);
            b.local("b", 2u32);
        })
        .unwrap();
        let view = group.export_readonly(Some(&["a"])).unwrap();
        let (seen, f) = recorder::<u32>();
        let _sub = view.subscribe::<u32>("a", f).unwrap();

        group.set("a", 10u32).unwrap();

        assert_eq!(view.get::<u32>("a").unwrap(), 10);
        assert_eq!(*seen.borrow(), vec![10]);
        assert_eq!(view.keys(), vec!["a".to_string()]);
        assert!(matches!(
            view.get::<u32>("b"),
            Err(StateError::UnknownKey { .. })
        ));
        assert!(matches!(
            group.export_readonly(Some(&["zzz"])),
            Err(StateError::UnknownKey { .. })
        ));

        let all = group.export_readonly(None).unwrap();
        assert_eq!(all.keys().len(), 2);

        view.close();
        assert_eq!(group.set("a", 11u32), Err(StateError::Closed));
        group.set("b", 3u32).unwrap();
    }

    #[test]
    fn test_group_snapshot() {
        let group = StateGroup::build(|b| {
            b.local("a", 1u32);
            b.local("b", "x".to_string());
        })
        .unwrap();
        group.set("a", 2u32).unwrap();

        let snap = group.snapshot().unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get::<u32>("a"), Some(&2));
        assert_eq!(snap.get::<String>("b").map(String::as_str), Some("x"));
        assert_eq!(snap.get::<u8>("a"), None);
        assert_eq!(format!("{snap:?}"), r#"{"a": 2, "b": "x"}"#);

        group.set("a", 3u32).unwrap();
        assert_eq!(snap.get::<u32>("a"), Some(&2));
    }

    #[test]
    fn test_closed_group_rejects_connect_and_views() {
        let service = Rc::new(MemoryService::new());
        let group = StateGroup::build(|b| {
            b.local("a", 1u32);
            b.remote("c", "tok", 0u32);
        })
        .unwrap();

        group.close_all();
        assert!(group.is_closed());
        assert_eq!(group.connect_service(service.clone()), Err(StateError::Closed));
        assert!(!service.is_registered("tok"));
        assert!(matches!(group.export_readonly(None), Err(StateError::Closed)));
        assert!(matches!(group.snapshot(), Err(StateError::Closed)));
        assert_eq!(group.get::<u32>("a").unwrap(), 1);
    }

    #[test]
    fn test_group_close_all_clears_listeners() {
        let service = Rc::new(MemoryService::new());
        let group = StateGroup::build(|b| {
            b.local("a", 0u32);
            b.remote("c", "c-token", 0u32);
        })
        .unwrap();
        group.connect_service(service.clone()).unwrap();

        let stale = group.cell::<u32>("a").unwrap();
        let (seen, f) = recorder::<u32>();
        let _sub = group.subscribe::<u32>("a", f).unwrap();

        group.close_all();
        group.close_all();

        assert_eq!(stale.set(5), Err(StateError::Closed));
        assert!(seen.borrow().is_empty());
        assert!(!service.is_registered("c-token"));
        assert!(group.remote_tokens().is_empty());
        assert_eq!(group.get::<u32>("a").unwrap(), 0);
    }

    #[test]
    fn test_group_tracing_keeps_listener() {
        let mut group = StateGroup::with_options(GroupOptions::traced("demo"));
        group
            .init(|b| {
                b.local("a", 1u32);
            })
            .unwrap();
        assert_eq!(group.cell::<u32>("a").unwrap().subscriber_count(), 1);
        group.set("a", 2u32).unwrap();
    }

    // stores

    #[test]
    fn test_store_lifecycle_errors() {
        let store = StateStore::new();
        assert_eq!(store.phase(), StorePhase::Uninitialized);
        assert_eq!(store.reset_states(), Err(StateError::NotInitialized));
        assert_eq!(store.get::<u32>("a"), Err(StateError::NotInitialized));

        store
            .create_states(|b| {
                b.local("a", 1u32);
            })
            .unwrap();
        assert_eq!(
            store.create_states(|_| {}),
            Err(StateError::AlreadyInitialized)
        );

        store.close_states();
        store.close_states();
        assert!(store.is_closed());
        assert_eq!(store.get::<u32>("a"), Err(StateError::Closed));
        assert_eq!(store.set("a", 2u32), Err(StateError::Closed));
        assert!(matches!(
            store.subscribe::<u32>("a", |_| {}),
            Err(StateError::Closed)
        ));
        assert_eq!(store.reset_states(), Err(StateError::Closed));
    }

    #[test]
    fn test_store_end_to_end() {
        let store = demo_store();
        let service = Rc::new(MemoryService::new());
        store.connect_service(service.clone()).unwrap();

        store.set("a", Some("x".to_string())).unwrap();
        assert_eq!(
            store.get::<Option<String>>("a").unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(store.get::<String>("b").unwrap(), "1");

        assert!(matches!(
            store.set("c", Some("anything".to_string())),
            Err(StateError::RemoteStateImmutable { .. })
        ));

        let (seen, f) = recorder::<Option<String>>();
        let _sub = store.subscribe::<Option<String>>("c", f).unwrap();
        service.push("c-token", Some("y".to_string()));

        assert_eq!(
            store.get::<Option<String>>("c").unwrap().as_deref(),
            Some("y")
        );
        assert_eq!(*seen.borrow(), vec![Some("y".to_string())]);
    }

    #[test]
    fn test_store_subscription_bookkeeping() {
        let store = demo_store();
        let (seen, f) = recorder::<String>();
        let sub = store.subscribe::<String>("b", f).unwrap();
        let _other = store.subscribe::<String>("b", |_| {}).unwrap();
        assert_eq!(store.consumer_count("b"), 2);
        assert!(sub.is_active());

        store.set("b", "2".to_string()).unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        store.set("b", "3".to_string()).unwrap();

        assert_eq!(*seen.borrow(), vec!["2".to_string()]);
        assert_eq!(store.consumer_count("b"), 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_store_close_subscriptions_keeps_cells_open() {
        let store = demo_store();
        let (seen, f) = recorder::<String>();
        let sub = store.subscribe::<String>("b", f).unwrap();
        let direct = store.cell::<String>("b").unwrap();
        let (direct_seen, g) = recorder::<String>();
        let _direct_sub = direct.subscribe(g).unwrap();

        store.close_subscriptions();
        store.set("b", "2".to_string()).unwrap();

        assert!(seen.borrow().is_empty());
        assert!(!sub.is_active());
        assert_eq!(*direct_seen.borrow(), vec!["2".to_string()]);
        assert_eq!(store.consumer_count("b"), 0);
    }

    #[test]
    fn test_store_reset_restores_defaults() {
        let store = demo_store();
        store.set("b", "changed".to_string()).unwrap();
        store.reset_states().unwrap();
        assert_eq!(store.get::<String>("b").unwrap(), "1");
        store.reset_states().unwrap();
        assert_eq!(store.get::<Option<String>>("a").unwrap(), None);
    }

    #[test]
    fn test_store_reset_retires_stale_handles() {
        let store = demo_store();
        let stale = store.cell::<String>("b").unwrap();
        store.reset_states().unwrap();

        assert_eq!(stale.set("x".to_string()), Err(StateError::Closed));
        let fresh = store.cell::<String>("b").unwrap();
        assert!(!stale.same(&fresh));
        fresh.set("y".to_string()).unwrap();
        assert_eq!(store.get::<String>("b").unwrap(), "y");
    }

    #[test]
    fn test_store_reset_moves_subscriptions() {
        let store = demo_store();
        let (seen, f) = recorder::<String>();
        let sub = store.subscribe::<String>("b", f).unwrap();
        store.set("b", "2".to_string()).unwrap();

        store.reset_states().unwrap();
        assert!(sub.is_active());
        store.set("b", "3".to_string()).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec!["2".to_string(), "1".to_string(), "3".to_string()]
        );
    }

    #[test]
    fn test_store_reset_reconnects_service() {
        let store = demo_store();
        let service = Rc::new(MemoryService::new());
        store.connect_service(service.clone()).unwrap();

        store.reset_states().unwrap();
        assert_eq!(service.registration_count("c-token"), 1);

        service.push("c-token", Some("z".to_string()));
        assert_eq!(
            store.get::<Option<String>>("c").unwrap().as_deref(),
            Some("z")
        );
    }

    #[test]
    fn test_store_close_states_silences_everything() {
        let store = demo_store();
        let service = Rc::new(MemoryService::new());
        store.connect_service(service.clone()).unwrap();

        let stale = store.cell::<String>("b").unwrap();
        let (seen, f) = recorder::<String>();
        let _sub = stale.subscribe(f).unwrap();

        store.close_states();

        assert_eq!(stale.set("x".to_string()), Err(StateError::Closed));
        assert!(seen.borrow().is_empty());
        assert!(!service.is_registered("c-token"));
        assert_eq!(stale.get(), "1");
    }

    #[test]
    fn test_store_inspection() {
        let store = demo_store();
        let _sub = store.subscribe::<String>("b", |_| {}).unwrap();
        store.set("a", Some("x".to_string())).unwrap();

        let report = store.inspect().unwrap();
        let a = report.get("a").unwrap();
        assert_eq!(a.kind, StateKind::Local);
        assert_eq!(a.value, r#"Some("x")"#);
        assert_eq!(a.consumers, 0);

        let b = report.get("b").unwrap();
        assert_eq!(b.consumers, 1);
        assert_eq!(b.subscribers, 1);

        let c = report.get("c").unwrap();
        assert_eq!(c.kind, StateKind::Remote);
        assert_eq!(c.token.as_deref(), Some("c-token"));
    }

    // scopes and compositions

    #[test]
    fn test_scope_explicit_dispose_runs_once() {
        let runs = Rc::new(RefCell::new(0));
        let scope = Scope::new();
        scope.add_disposer({
            let runs = runs.clone();
            move || *runs.borrow_mut() += 1
        });

        assert_eq!(*runs.borrow(), 0);
        scope.dispose();
        scope.dispose();
        assert_eq!(*runs.borrow(), 1);
        assert!(scope.is_disposed());
    }

    #[test]
    fn test_scope_disposes_children_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let parent = Scope::new();
        let child = parent.child();
        parent.add_disposer({
            let order = order.clone();
            move || order.borrow_mut().push("parent")
        });
        child.add_disposer({
            let order = order.clone();
            move || order.borrow_mut().push("child")
        });

        parent.dispose();
        assert_eq!(*order.borrow(), vec!["child", "parent"]);
    }

    #[test]
    fn test_effect_registers_with_current_scope() {
        let runs = Rc::new(RefCell::new(0));
        let scope = Scope::new();
        let d = scope.run(|| {
            effect({
                let runs = runs.clone();
                move || Dispose::new(move || *runs.borrow_mut() += 1)
            })
        });

        assert!(d.is_pending());
        assert_eq!(scope.pending_disposers(), 1);
        scope.dispose();
        assert_eq!(*runs.borrow(), 1);
        assert!(!d.is_pending());
    }

    #[test]
    fn test_effect_cleanup_run_early_runs_once() {
        let runs = Rc::new(RefCell::new(0));
        let scope = Scope::new();
        let d = scope.run(|| {
            effect({
                let runs = runs.clone();
                move || Dispose::new(move || *runs.borrow_mut() += 1)
            })
        });

        d.run();
        scope.dispose();
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn test_hooks_register_cleanup_with_composition_scope() {
        let cell = state(0);
        let store = demo_store();
        let view = Composition::new();

        view.compose(|| {
            use_state(&cell);
            use_state_changed(&cell, |_| {});
            use_store_state::<String>(&store, "b").unwrap();
        });
        assert_eq!(view.scope().pending_disposers(), 3);

        view.dispose();
        assert_eq!(cell.subscriber_count(), 0);
        assert_eq!(store.consumer_count("b"), 0);
    }

    #[test]
    fn test_subscription_into_dispose() {
        let cell = state(0);
        let d = cell.subscribe(|_| {}).unwrap().into_dispose();
        assert_eq!(cell.subscriber_count(), 1);
        d.run();
        d.run();
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_remember_persists_across_renders() {
        let view = Composition::new();
        let first = view.compose(|| remember(|| 42));
        let second = view.compose(|| remember(|| 100));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*second, 42);

        let keyed = view.compose(|| remember_with_key("k", || "a"));
        let again = view.compose(|| remember_with_key("k", || "b"));
        assert_eq!(*keyed, "a");
        assert_eq!(*again, "a");
        assert_eq!(view.render_count(), 4);
    }

    #[test]
    fn test_use_state_subscribes_once_and_releases_once() {
        let cell = state(1);
        let view = Composition::new();

        for _ in 0..3 {
            assert_eq!(view.compose(|| use_state(&cell)), 1);
        }
        assert_eq!(cell.subscriber_count(), 1);

        cell.set(2).unwrap();
        assert!(view.is_dirty());
        assert_eq!(view.compose(|| use_state(&cell)), 2);
        assert!(!view.is_dirty());

        view.dispose();
        view.dispose();
        assert_eq!(cell.subscriber_count(), 0);

        cell.set(3).unwrap();
        assert!(!view.is_dirty());
    }

    #[test]
    fn test_use_state_on_remote_cell() {
        let service = Rc::new(MemoryService::new());
        let remote = RemoteCell::<Option<u32>>::empty("t");
        remote.connect(service.clone()).unwrap();

        let invalidations = Rc::new(RefCell::new(0));
        let view = Composition::new();
        view.set_on_invalidate({
            let invalidations = invalidations.clone();
            move || *invalidations.borrow_mut() += 1
        });

        assert_eq!(view.compose(|| use_state(&remote)), None);
        service.push("t", Some(4u32));
        assert_eq!(*invalidations.borrow(), 1);
        assert_eq!(view.compose(|| use_state(&remote)), Some(4));
    }

    #[test]
    fn test_use_state_outside_composition_reads_only() {
        let cell = state(5);
        assert_eq!(use_state(&cell), 5);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_use_state_on_closed_cell_shows_last_value() {
        let cell = state(5);
        cell.close();
        let view = Composition::new();
        assert_eq!(view.compose(|| use_state(&cell)), 5);
        assert_eq!(view.compose(|| use_state(&cell)), 5);
    }

    #[test]
    fn test_use_state_changed_uses_latest_callback() {
        let cell = state(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let view = Composition::new();

        for tag in ["first", "second"] {
            let log = log.clone();
            view.compose(|| use_state_changed(&cell, move |v| log.borrow_mut().push((tag, *v))));
        }
        assert_eq!(cell.subscriber_count(), 1);

        cell.set(1).unwrap();
        assert_eq!(*log.borrow(), vec![("second", 1)]);

        view.dispose();
        cell.set(2).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_use_store_state_follows_reset() {
        let store = demo_store();
        let view = Composition::new();

        let render = || view.compose(|| use_store_state::<String>(&store, "b").unwrap());
        assert_eq!(render(), "1");

        store.set("b", "2".to_string()).unwrap();
        assert!(view.take_dirty());
        assert_eq!(render(), "2");

        store.reset_states().unwrap();
        assert!(view.take_dirty());
        assert_eq!(render(), "1");
        assert_eq!(store.consumer_count("b"), 1);

        view.dispose();
        assert_eq!(store.consumer_count("b"), 0);
    }

    #[test]
    fn test_use_set_state_outlives_caller_handle() {
        let store = Rc::new(demo_store());
        let b = store.cell::<String>("b").unwrap();
        let set_b = use_set_state::<String>(&store, "b").unwrap();
        drop(store);

        set_b("kept".to_string()).unwrap();
        assert_eq!(b.get(), "kept");
    }

    #[test]
    fn test_use_set_state_local_only() {
        let store = Rc::new(demo_store());
        let set_b = use_set_state::<String>(&store, "b").unwrap();
        set_b("2".to_string()).unwrap();
        assert_eq!(store.get::<String>("b").unwrap(), "2");

        assert!(matches!(
            use_set_state::<Option<String>>(&store, "c"),
            Err(StateError::RemoteStateImmutable { .. })
        ));
    }
}
