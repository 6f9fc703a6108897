mod common;

use common::{CreateBehavior, harness, webhook};
use giftflow_core::engine::{
    CancelAuthority, DonorIdentity, InitiateDonation, WebhookDisposition,
};
use giftflow_core::entities::{Currency, DonationState, PaymentProvider};
use giftflow_core::error::DonationError;
use giftflow_core::providers::{PaymentOutcome, ProviderError};
use giftflow_core::status::{PaymentValidityPolicy, StatusQueryService};
use giftflow_core::store::DonationStore;
use giftflow_sdk::objects::Continuation;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn card(user_id: i64, amount: Decimal) -> InitiateDonation {
    InitiateDonation {
        donor: DonorIdentity::User(user_id),
        amount,
        currency: Currency::Usd,
        provider: PaymentProvider::Card,
        message: Some("For the youth ministry".into()),
        phone_number: None,
    }
}

fn mobile_money(user_id: i64, phone: &str) -> InitiateDonation {
    InitiateDonation {
        donor: DonorIdentity::User(user_id),
        amount: dec!(10),
        currency: Currency::Ghs,
        provider: PaymentProvider::MobileMoney,
        message: None,
        phone_number: Some(phone.into()),
    }
}

fn anonymous_card(amount: Decimal) -> InitiateDonation {
    InitiateDonation {
        donor: DonorIdentity::Anonymous {
            email: Some("friend@example.org".into()),
        },
        ..card(0, amount)
    }
}

#[tokio::test]
async fn card_donation_is_paid_by_webhook() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();

    let donation = initiated.donation;
    assert_eq!(donation.state, DonationState::Pending);
    assert_eq!(donation.user_id, Some(7));
    let reference = donation.provider_reference.clone().unwrap();
    assert!(matches!(initiated.continuation, Continuation::Redirect { .. }));
    assert_eq!(initiated.cancel_token, None);

    let (payload, headers) = webhook(&reference, "paid");
    let disposition = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    let WebhookDisposition::Applied(paid) = disposition else {
        panic!("expected the webhook to apply, got {disposition:?}");
    };
    assert_eq!(paid.state, DonationState::Paid);
    assert_eq!(paid.amount, dec!(25.00));
    assert_eq!(paid.version, donation.version + 1);
}

#[tokio::test]
async fn second_donation_while_pending_is_refused() {
    let h = harness();
    let first = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();

    let err = h
        .engine
        .initiate(mobile_money(7, "0244123456"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DonationError::PendingDonationExists { donation_id } if donation_id == first.donation.id
    ));
    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.mobile_money.creates(), 0);
}

#[tokio::test]
async fn concurrent_initiates_create_a_single_pending_donation() {
    let h = harness();
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&h.engine);
        tasks.push(tokio::spawn(async move {
            engine.initiate(card(7, dec!(5.00))).await
        }));
    }

    let mut created = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(DonationError::PendingDonationExists { .. }) => refused += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(refused, 15);
    assert_eq!(h.store.len().await, 1);
    assert!(h.store.get_pending_for_user(7).await.unwrap().is_some());
}

#[tokio::test]
async fn other_users_are_not_blocked() {
    let h = harness();
    h.engine.initiate(card(7, dec!(5.00))).await.unwrap();
    h.engine.initiate(card(8, dec!(5.00))).await.unwrap();
    h.engine.initiate(anonymous_card(dec!(5.00))).await.unwrap();
    h.engine.initiate(anonymous_card(dec!(5.00))).await.unwrap();
    assert_eq!(h.store.len().await, 4);
}

#[tokio::test]
async fn duplicate_webhook_delivery_is_a_no_op() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
    let reference = initiated.donation.provider_reference.unwrap();
    let (payload, headers) = webhook(&reference, "paid");

    let first = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    let second = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();

    let WebhookDisposition::Applied(after_first) = first else {
        panic!("first delivery should apply");
    };
    let WebhookDisposition::AlreadyTerminal(after_second) = second else {
        panic!("second delivery should be dropped");
    };
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn paid_webhook_after_cancel_is_dropped() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
    let id = initiated.donation.id;
    let reference = initiated.donation.provider_reference.unwrap();

    let cancelled = h.engine.cancel(id, CancelAuthority::User(7)).await.unwrap();
    assert_eq!(cancelled.state, DonationState::Cancelled);

    let (payload, headers) = webhook(&reference, "paid");
    let disposition = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    assert!(matches!(disposition, WebhookDisposition::AlreadyTerminal(_)));
    assert_eq!(
        h.engine.get(id).await.unwrap().state,
        DonationState::Cancelled
    );
}

#[tokio::test]
async fn terminal_states_are_never_overwritten() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
    let id = initiated.donation.id;
    let reference = initiated.donation.provider_reference.unwrap();

    let (payload, headers) = webhook(&reference, "failed");
    h.engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    let failed = h.engine.get(id).await.unwrap();
    assert_eq!(failed.state, DonationState::Failed);

    let (payload, headers) = webhook(&reference, "paid");
    h.engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    h.card.set_status(&reference, PaymentOutcome::Paid);
    h.engine.poll_status(&reference).await.unwrap();
    let err = h.engine.cancel(id, CancelAuthority::User(7)).await.unwrap_err();
    assert!(matches!(
        err,
        DonationError::AlreadyTerminal { state: DonationState::Failed, .. }
    ));

    assert_eq!(h.engine.get(id).await.unwrap(), failed);
}

#[tokio::test]
async fn forged_webhook_changes_nothing() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
    let reference = initiated.donation.provider_reference.unwrap();
    let (payload, _) = webhook(&reference, "paid");

    let err = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &HeaderMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DonationError::InvalidSignature(_)));
    assert_eq!(
        h.engine.get(initiated.donation.id).await.unwrap().state,
        DonationState::Pending
    );
}

#[tokio::test]
async fn webhook_for_unknown_reference_is_dropped() {
    let h = harness();
    let (payload, headers) = webhook("sess_someone_else", "paid");
    let disposition = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    assert_eq!(
        disposition,
        WebhookDisposition::UnknownReference("sess_someone_else".into())
    );
}

#[tokio::test]
async fn provider_failure_keeps_a_failed_row_and_frees_the_slot() {
    let h = harness();
    h.card
        .set_behavior(CreateBehavior::Fail(ProviderError::Unavailable("503".into())));

    let err = h.engine.initiate(card(7, dec!(25.00))).await.unwrap_err();
    assert!(matches!(err, DonationError::ProviderUnavailable(_)));

    let history = h.store.list_for_user(7).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, DonationState::Failed);
    assert_eq!(history[0].provider_reference, None);
    assert!(history[0].failure_reason.as_deref().unwrap().contains("503"));
    assert!(h.store.get_pending_for_user(7).await.unwrap().is_none());

    h.card.set_behavior(CreateBehavior::Accept);
    h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
}

#[tokio::test]
async fn provider_rejection_is_reported() {
    let h = harness();
    h.mobile_money.set_behavior(CreateBehavior::Fail(ProviderError::Rejected(
        "PAYER_NOT_FOUND".into(),
    )));
    let err = h
        .engine
        .initiate(mobile_money(7, "0244123456"))
        .await
        .unwrap_err();
    assert!(matches!(err, DonationError::ProviderRejected(ref m) if m == "PAYER_NOT_FOUND"));
    assert_eq!(
        h.store.list_for_user(7).await.unwrap()[0].state,
        DonationState::Failed
    );
}

#[tokio::test]
async fn provider_timeout_marks_the_donation_failed() {
    let h = harness();
    h.card.set_behavior(CreateBehavior::Hang);

    let err = h.engine.initiate(card(7, dec!(25.00))).await.unwrap_err();
    assert!(matches!(err, DonationError::ProviderUnavailable(_)));

    let history = h.store.list_for_user(7).await.unwrap();
    assert_eq!(history[0].state, DonationState::Failed);
    assert_eq!(history[0].provider_reference, None);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_provider() {
    let h = harness();

    for amount in [dec!(0), dec!(-5), dec!(1.005)] {
        let err = h.engine.initiate(card(7, amount)).await.unwrap_err();
        assert!(matches!(err, DonationError::InvalidRequest(_)), "{amount}");
    }

    let mut usd_on_mobile_money = mobile_money(7, "0244123456");
    usd_on_mobile_money.currency = Currency::Usd;
    assert!(matches!(
        h.engine.initiate(usd_on_mobile_money).await,
        Err(DonationError::InvalidRequest(_))
    ));

    let mut no_phone = mobile_money(7, "0244123456");
    no_phone.phone_number = None;
    assert!(matches!(
        h.engine.initiate(no_phone).await,
        Err(DonationError::InvalidRequest(_))
    ));

    assert!(matches!(
        h.engine.initiate(mobile_money(7, "12345")).await,
        Err(DonationError::InvalidPhoneNumber(_))
    ));

    assert_eq!(h.card.creates(), 0);
    assert_eq!(h.mobile_money.creates(), 0);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn mobile_money_is_settled_by_polling() {
    let h = harness();
    let initiated = h
        .engine
        .initiate(mobile_money(7, "024 412 3456"))
        .await
        .unwrap();
    let reference = initiated.donation.provider_reference.clone().unwrap();
    assert!(matches!(
        initiated.continuation,
        Continuation::AwaitApproval { ref transaction_id } if *transaction_id == reference
    ));

    let still_pending = h.engine.poll_status(&reference).await.unwrap();
    assert_eq!(still_pending.state, DonationState::Pending);

    h.mobile_money.set_status(&reference, PaymentOutcome::Paid);
    let paid = h.engine.poll_status(&reference).await.unwrap();
    assert_eq!(paid.state, DonationState::Paid);
    assert_eq!(h.mobile_money.queries(), 2);

    // Terminal donations are answered from the store.
    let again = h.engine.poll_status(&reference).await.unwrap();
    assert_eq!(again, paid);
    assert_eq!(h.mobile_money.queries(), 2);
}

#[tokio::test]
async fn poll_failure_is_recorded_with_reason() {
    let h = harness();
    let initiated = h
        .engine
        .initiate(mobile_money(7, "233244123456"))
        .await
        .unwrap();
    let reference = initiated.donation.provider_reference.unwrap();
    h.mobile_money.set_status(
        &reference,
        PaymentOutcome::Failed {
            reason: Some("APPROVAL_REJECTED".into()),
        },
    );

    let failed = h.engine.poll_status(&reference).await.unwrap();
    assert_eq!(failed.state, DonationState::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("APPROVAL_REJECTED"));
}

#[tokio::test]
async fn poll_for_unknown_reference_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.engine.poll_status("nope").await,
        Err(DonationError::NotFound(_))
    ));
}

#[tokio::test]
async fn cancellation_is_restricted_to_the_owner() {
    let h = harness();
    let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
    let id = initiated.donation.id;

    assert!(matches!(
        h.engine.cancel(id, CancelAuthority::User(8)).await,
        Err(DonationError::Forbidden(_))
    ));
    assert!(matches!(
        h.engine
            .cancel(id, CancelAuthority::Token("guess".into()))
            .await,
        Err(DonationError::Forbidden(_))
    ));
    assert!(matches!(
        h.engine
            .cancel(uuid::Uuid::now_v7(), CancelAuthority::User(7))
            .await,
        Err(DonationError::NotFound(_))
    ));

    h.engine.cancel(id, CancelAuthority::User(7)).await.unwrap();
    assert!(matches!(
        h.engine.cancel(id, CancelAuthority::User(7)).await,
        Err(DonationError::AlreadyTerminal {
            state: DonationState::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn anonymous_donor_cancels_with_token() {
    let h = harness();
    let initiated = h.engine.initiate(anonymous_card(dec!(12.00))).await.unwrap();
    let id = initiated.donation.id;
    let token = initiated.cancel_token.clone().unwrap();
    assert_eq!(
        initiated.donation.contact_email.as_deref(),
        Some("friend@example.org")
    );
    assert_ne!(initiated.donation.cancel_token_hash.as_deref(), Some(token.as_str()));

    assert!(matches!(
        h.engine.cancel(id, CancelAuthority::User(7)).await,
        Err(DonationError::Forbidden(_))
    ));
    assert!(matches!(
        h.engine
            .cancel(id, CancelAuthority::Token(format!("{token}x")))
            .await,
        Err(DonationError::Forbidden(_))
    ));

    let cancelled = h.engine.cancel(id, CancelAuthority::Token(token)).await.unwrap();
    assert_eq!(cancelled.state, DonationState::Cancelled);
}

#[tokio::test]
async fn cancel_while_provider_call_is_in_flight() {
    let h = harness_with_slow_timeout();
    h.card.set_behavior(CreateBehavior::WaitForRelease);

    let engine = Arc::clone(&h.engine);
    let initiate = tokio::spawn(async move { engine.initiate(card(7, dec!(25.00))).await });

    let pending = loop {
        if let Some(d) = h.store.get_pending_for_user(7).await.unwrap() {
            break d;
        }
        tokio::task::yield_now().await;
    };
    h.engine
        .cancel(pending.id, CancelAuthority::User(7))
        .await
        .unwrap();
    h.card.release();

    let err = initiate.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        DonationError::AlreadyTerminal {
            state: DonationState::Cancelled,
            ..
        }
    ));

    // The reference is still recorded, so a late webhook is recognised and dropped.
    let stored = h.engine.get(pending.id).await.unwrap();
    let reference = stored.provider_reference.clone().unwrap();
    let (payload, headers) = webhook(&reference, "paid");
    let disposition = h
        .engine
        .handle_webhook(PaymentProvider::Card, &payload, &headers)
        .await
        .unwrap();
    assert!(matches!(disposition, WebhookDisposition::AlreadyTerminal(_)));
    assert_eq!(
        h.engine.get(pending.id).await.unwrap().state,
        DonationState::Cancelled
    );
}

#[tokio::test]
async fn webhook_and_cancel_race_has_exactly_one_winner() {
    for _ in 0..25 {
        let h = harness();
        let initiated = h.engine.initiate(card(7, dec!(25.00))).await.unwrap();
        let id = initiated.donation.id;
        let reference = initiated.donation.provider_reference.unwrap();

        let engine = Arc::clone(&h.engine);
        let webhook_task = tokio::spawn(async move {
            let (payload, headers) = webhook(&reference, "paid");
            engine
                .handle_webhook(PaymentProvider::Card, &payload, &headers)
                .await
        });
        let engine = Arc::clone(&h.engine);
        let cancel_task =
            tokio::spawn(async move { engine.cancel(id, CancelAuthority::User(7)).await });

        let disposition = webhook_task.await.unwrap().unwrap();
        let cancel_result = cancel_task.await.unwrap();
        let final_state = h.engine.get(id).await.unwrap().state;

        match final_state {
            DonationState::Paid => {
                assert!(matches!(disposition, WebhookDisposition::Applied(_)));
                // The losing cancel is either refused up front or observes paid.
                match cancel_result {
                    Ok(d) => assert_eq!(d.state, DonationState::Paid),
                    Err(e) => assert!(matches!(e, DonationError::AlreadyTerminal { .. })),
                }
            }
            DonationState::Cancelled => {
                assert!(matches!(disposition, WebhookDisposition::AlreadyTerminal(_)));
                assert_eq!(cancel_result.unwrap().state, DonationState::Cancelled);
            }
            other => panic!("unexpected final state {other}"),
        }
    }
}

#[tokio::test]
async fn summary_matches_paid_donations_per_currency() {
    let h = harness();
    let status = StatusQueryService::new(
        Arc::clone(h.engine.store()),
        PaymentValidityPolicy::AnyPaidDonation,
    );

    for (amount, currency) in [
        (dec!(25.00), Currency::Usd),
        (dec!(10.00), Currency::Ghs),
        (dec!(7.25), Currency::Usd),
    ] {
        let mut request = card(7, amount);
        request.currency = currency;
        let initiated = h.engine.initiate(request).await.unwrap();
        let reference = initiated.donation.provider_reference.unwrap();
        let (payload, headers) = webhook(&reference, "paid");
        h.engine
            .handle_webhook(PaymentProvider::Card, &payload, &headers)
            .await
            .unwrap();
    }
    let open = h.engine.initiate(card(7, dec!(99.00))).await.unwrap();

    let summary = status.summary_for(7).await.unwrap();
    assert_eq!(summary.completed_count, 3);
    assert_eq!(summary.pending_count, 1);
    assert_eq!(summary.total_paid.get(&Currency::Usd), Some(&dec!(32.25)));
    assert_eq!(summary.total_paid.get(&Currency::Ghs), Some(&dec!(10.00)));

    let history = status.list_donations(7).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].id, open.donation.id);
    assert!(status.is_payment_valid(7).await.unwrap());
    assert!(!status.is_payment_valid(8).await.unwrap());
}

fn harness_with_slow_timeout() -> common::Harness {
    common::harness_with(giftflow_core::engine::EngineConfig {
        provider_timeout: Duration::from_secs(10),
        ..Default::default()
    })
}
