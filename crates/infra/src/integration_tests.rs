//! Integration tests for the full service pipeline.
//!
//! Tests: draft input → LabService → InMemoryLabStore → listing
//!
//! Verifies:
//! - The borrow lifecycle keeps item stock consistent
//! - Failed transitions leave request and item untouched
//! - Concurrent approvals against one item never oversubscribe it

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, Utc};

    use labloan_auth::SignupDraft;
    use labloan_borrowing::{BorrowDraft, BorrowStatus, RequestFilter, Urgency};
    use labloan_core::{BorrowRequestId, ItemId};
    use labloan_inventory::{Item, ItemDraft};

    use crate::service::{LabService, ServiceError};
    use crate::store::InMemoryLabStore;

    fn setup() -> LabService<Arc<InMemoryLabStore>> {
        LabService::new(Arc::new(InMemoryLabStore::new()))
    }

    fn item_draft(name: &str, quantity: i64) -> ItemDraft {
        ItemDraft {
            name: Some(name.to_string()),
            category: Some("IC".to_string()),
            quantity: Some(quantity),
            location: Some("Drawer 1".to_string()),
            last_checked: NaiveDate::from_ymd_opt(2024, 9, 1),
        }
    }

    fn borrow(item_id: ItemId, who: &str, quantity: i64) -> BorrowDraft {
        BorrowDraft {
            item_id: Some(item_id),
            requester_name: Some(who.to_string()),
            due_date: NaiveDate::from_ymd_opt(2024, 10, 1),
            quantity: Some(quantity),
        }
    }

    async fn stock(svc: &LabService<Arc<InMemoryLabStore>>, item: &Item) -> i64 {
        svc.get_item(item.id).await.unwrap().quantity
    }

    #[tokio::test]
    async fn arduino_scenario_first_come_first_served() {
        let svc = setup();
        let item = svc.add_item(item_draft("Arduino Uno", 5)).await.unwrap();
        let a = svc.create_request(borrow(item.id, "Alice", 3)).await.unwrap();
        let b = svc.create_request(borrow(item.id, "Bob", 3)).await.unwrap();

        svc.transition(a.id, BorrowStatus::Approved).await.unwrap();
        assert_eq!(stock(&svc, &item).await, 2);

        let err = svc.transition(b.id, BorrowStatus::Approved).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(svc.get_request(b.id).await.unwrap().status, BorrowStatus::Pending);
        assert_eq!(stock(&svc, &item).await, 2);

        svc.transition(a.id, BorrowStatus::Returned).await.unwrap();
        assert_eq!(stock(&svc, &item).await, 5);
    }

    #[tokio::test]
    async fn created_request_lists_as_pending_with_exact_fields() {
        let svc = setup();
        let item = svc.add_item(item_draft("Oscilloscope", 1)).await.unwrap();
        let created = svc.create_request(borrow(item.id, "Carol", 2)).await.unwrap();

        let listed = svc.list_requests(&RequestFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        let view = &listed[0];
        assert_eq!(view.item_name, "Oscilloscope");
        assert_eq!(view.request.id, created.id);
        assert_eq!(view.request.status, BorrowStatus::Pending);
        assert_eq!(view.request.requester_name, "Carol");
        assert_eq!(view.request.item_id, item.id);
        assert_eq!(view.request.due_date, NaiveDate::from_ymd_opt(2024, 10, 1).unwrap());
        assert_eq!(view.request.quantity, 2);
    }

    #[tokio::test]
    async fn creation_does_not_check_stock() {
        let svc = setup();
        let item = svc.add_item(item_draft("Logic analyzer", 1)).await.unwrap();
        assert!(svc.create_request(borrow(item.id, "Dan", 10)).await.is_ok());
    }

    #[tokio::test]
    async fn creation_validates_input_and_item_reference() {
        let svc = setup();
        let err = svc
            .create_request(BorrowDraft { quantity: Some(0), ..borrow(ItemId::new(), "Eve", 1) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = svc.create_request(borrow(ItemId::new(), "Eve", 1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_transitions_have_no_side_effect() {
        let svc = setup();
        let item = svc.add_item(item_draft("Function generator", 4)).await.unwrap();
        let req = svc.create_request(borrow(item.id, "Frank", 2)).await.unwrap();

        for target in [BorrowStatus::Returned, BorrowStatus::Pending] {
            let err = svc.transition(req.id, target).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        }
        assert_eq!(stock(&svc, &item).await, 4);

        svc.transition(req.id, BorrowStatus::Approved).await.unwrap();
        let err = svc.transition(req.id, BorrowStatus::Approved).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        let err = svc.transition(req.id, BorrowStatus::Rejected).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        assert_eq!(stock(&svc, &item).await, 2);

        svc.transition(req.id, BorrowStatus::Returned).await.unwrap();
        let err = svc.transition(req.id, BorrowStatus::Returned).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        assert_eq!(stock(&svc, &item).await, 4);
    }

    #[tokio::test]
    async fn rejection_leaves_stock_alone() {
        let svc = setup();
        let item = svc.add_item(item_draft("Breadboard", 3)).await.unwrap();
        let req = svc.create_request(borrow(item.id, "Gina", 3)).await.unwrap();
        let committed = svc.transition(req.id, BorrowStatus::Rejected).await.unwrap();
        assert_eq!(committed.request.status, BorrowStatus::Rejected);
        assert_eq!(stock(&svc, &item).await, 3);
    }

    #[tokio::test]
    async fn return_is_additive_not_capped() {
        let svc = setup();
        let item = svc.add_item(item_draft("Probe set", 3)).await.unwrap();
        let req = svc.create_request(borrow(item.id, "Hank", 3)).await.unwrap();
        svc.transition(req.id, BorrowStatus::Approved).await.unwrap();

        // Manager restocks while the units are out.
        svc.update_item(item.id, item_draft("Probe set", 10)).await.unwrap();
        let committed = svc.transition(req.id, BorrowStatus::Returned).await.unwrap();
        assert_eq!(committed.item.quantity, 13);
    }

    #[tokio::test]
    async fn update_without_quantity_keeps_lent_stock_intact() {
        let svc = setup();
        let item = svc.add_item(item_draft("Logic analyzer", 5)).await.unwrap();
        let req = svc.create_request(borrow(item.id, "Ivy", 3)).await.unwrap();
        svc.transition(req.id, BorrowStatus::Approved).await.unwrap();

        let partial = ItemDraft {
            quantity: None,
            ..item_draft("Logic analyzer", 0)
        };
        let err = svc.update_item(item.id, partial).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(stock(&svc, &item).await, 2);

        svc.transition(req.id, BorrowStatus::Returned).await.unwrap();
        assert_eq!(stock(&svc, &item).await, 5);
    }

    #[tokio::test]
    async fn transition_on_unknown_request_is_not_found() {
        let svc = setup();
        let err = svc
            .transition(BorrowRequestId::new(), BorrowStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_item_with_pending_request_cascades() {
        let svc = setup();
        let item = svc.add_item(item_draft("Arduino Uno", 5)).await.unwrap();
        let req = svc.create_request(borrow(item.id, "Ivy", 1)).await.unwrap();

        let deleted = svc.delete_item(item.id).await.unwrap();
        assert_eq!(deleted.removed_requests, 1);
        assert!(matches!(svc.get_request(req.id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            svc.transition(req.id, BorrowStatus::Approved).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(svc.list_requests(&RequestFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_adjustment_never_goes_negative() {
        let svc = setup();
        let item = svc.add_item(item_draft("Jumper wires", 4)).await.unwrap();

        assert_eq!(svc.adjust_quantity(item.id, -4).await.unwrap().quantity, 0);
        let err = svc.adjust_quantity(item.id, -1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(svc.adjust_quantity(item.id, 6).await.unwrap().quantity, 6);
        assert!(matches!(
            svc.adjust_quantity(ItemId::new(), 1).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn add_item_rejects_missing_fields() {
        let svc = setup();
        let err = svc
            .add_item(ItemDraft { category: None, ..item_draft("Soldering station", 1) })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = svc.add_item(item_draft("Soldering station", -1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(svc.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_filters_by_requester_and_status() {
        let svc = setup();
        let item = svc.add_item(item_draft("Multimeter", 10)).await.unwrap();
        let a = svc.create_request(borrow(item.id, "Alice", 1)).await.unwrap();
        svc.create_request(borrow(item.id, "Bob", 1)).await.unwrap();
        svc.create_request(borrow(item.id, "Alice", 1)).await.unwrap();
        svc.transition(a.id, BorrowStatus::Approved).await.unwrap();

        let alice = svc.list_requests(&RequestFilter::by_requester("Alice")).await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].request.id, a.id);

        let approved = svc
            .list_requests(&RequestFilter::by_status(BorrowStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
    }

    #[tokio::test]
    async fn due_alerts_cover_approved_requests_only() {
        let svc = setup();
        let item = svc.add_item(item_draft("Arduino Uno", 10)).await.unwrap();
        let today = Utc::now().date_naive();

        let overdue = svc
            .create_request(BorrowDraft { due_date: Some(today - Duration::days(1)), ..borrow(item.id, "Alice", 1) })
            .await
            .unwrap();
        svc.transition(overdue.id, BorrowStatus::Approved).await.unwrap();
        svc.create_request(BorrowDraft { due_date: Some(today), ..borrow(item.id, "Bob", 1) })
            .await
            .unwrap();

        let all = svc.due_alerts(today, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].urgency, Urgency::Overdue);
        assert_eq!(all[0].message, "Item \"Arduino Uno\" (for Alice) is overdue!");

        let mine = svc.due_alerts(today, Some("Alice".to_string())).await.unwrap();
        assert_eq!(mine[0].message, "Item \"Arduino Uno\" is overdue!");
        assert!(svc.due_alerts(today, Some("Bob".to_string())).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_never_oversubscribe() {
        let svc = Arc::new(setup());
        let item = svc.add_item(item_draft("Raspberry Pi", 5)).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..8 {
            let req = svc.create_request(borrow(item.id, &format!("student-{i}"), 2)).await.unwrap();
            ids.push(req.id);
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.transition(id, BorrowStatus::Approved).await })
            })
            .collect();

        let mut approved = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => approved += 1,
                Err(e) => assert!(matches!(e, ServiceError::Conflict(_))),
            }
        }

        assert_eq!(approved, 2);
        assert_eq!(stock(&svc, &item).await, 1);
        let still_pending = svc
            .list_requests(&RequestFilter::by_status(BorrowStatus::Pending))
            .await
            .unwrap();
        assert_eq!(still_pending.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_transitions_on_one_request_apply_once() {
        let svc = Arc::new(setup());
        let item = svc.add_item(item_draft("Thermal camera", 3)).await.unwrap();
        let req_id = svc.create_request(borrow(item.id, "Jo", 1)).await.unwrap().id;

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let svc = svc.clone();
                let target = if i % 2 == 0 { BorrowStatus::Approved } else { BorrowStatus::Rejected };
                tokio::spawn(async move { svc.transition(req_id, target).await })
            })
            .collect();

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let status = svc.get_request(req_id).await.unwrap().status;
        let expected_stock = if status == BorrowStatus::Approved { 2 } else { 3 };
        assert_eq!(stock(&svc, &item).await, expected_stock);
    }

    #[tokio::test]
    async fn signup_login_round_trip() {
        let svc = setup();
        let user = svc
            .signup(SignupDraft {
                username: Some("jdoe".to_string()),
                password: Some("hunter2".to_string()),
                name: Some("Jane Doe".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(user.role, labloan_auth::Role::Student);

        let logged_in = svc.login("jdoe", "hunter2").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(svc.login("jdoe", "wrong").await.unwrap_err(), ServiceError::Unauthorized);
        assert_eq!(svc.login("nobody", "hunter2").await.unwrap_err(), ServiceError::Unauthorized);

        let dup = svc
            .signup(SignupDraft {
                username: Some("jdoe".to_string()),
                password: Some("x".to_string()),
                name: Some("Other".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(dup, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn demo_users_seed_only_into_empty_directory() {
        let svc = setup();
        assert_eq!(svc.seed_demo_users().await.unwrap(), 2);
        assert_eq!(svc.seed_demo_users().await.unwrap(), 0);
        let admin = svc.login("admin", "admin123").await.unwrap();
        assert!(admin.is_admin());
    }
}
