use std::sync::{Arc, Mutex};

use anyhow::Context;
use sled::open;

use food_trade::{
    dispatch::{DispatchError, EmailDispatch, NullDispatch},
    error::ErrorKind,
    food::{Category, OfferFilters},
    notification::{EmailNotice, NotificationKind},
    service::TradeService,
    session::{AuthHandle, Session},
    trade::{TradeStatus, Wanted},
    user::User,
    utils,
};

use tempfile::tempdir; // Use for test db cleanup.

/// Captures every notice the engine emits so scenarios can assert on them.
#[derive(Default)]
struct RecordingMailer(Mutex<Vec<EmailNotice>>);

impl RecordingMailer {
    fn notices(&self) -> Vec<EmailNotice> {
        self.0.lock().unwrap().clone()
    }
}

impl EmailDispatch for RecordingMailer {
    fn deliver(&self, notice: &EmailNotice) -> Result<(), DispatchError> {
        self.0.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// A mail backend that is always down.
struct FailingMailer;

impl EmailDispatch for FailingMailer {
    fn deliver(&self, _notice: &EmailNotice) -> Result<(), DispatchError> {
        Err(DispatchError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }
}

// Sled uses file-based locking to prevent concurrent access, so each test
// opens its own database on temp for simplified cleanup.
fn new_service(
    dir: &tempfile::TempDir,
    name: &str,
    mailer: Arc<dyn EmailDispatch>,
) -> anyhow::Result<TradeService> {
    let db = open(dir.path().join(name))?;
    db.clear()?;
    Ok(TradeService::new(Arc::new(db), mailer)?)
}

fn register(service: &TradeService, name: &str, grade: &str) -> anyhow::Result<User> {
    let handle = AuthHandle {
        uid: utils::new_uuid_to_bech32("user_")?,
        email: format!("{}@school.test", name.to_lowercase()),
    };
    Ok(service.register_user(&handle, name, &name.to_lowercase(), grade)?)
}

fn admin_session() -> Session {
    Session {
        user_id: "user_admin".to_string(),
        is_admin: true,
    }
}

/// Pick a seeded food id by a name fragment.
fn food_id(service: &TradeService, fragment: &str) -> anyhow::Result<String> {
    for food in service.foods() {
        let food = food?;
        if food.name.contains(fragment) {
            return Ok(food.id);
        }
    }
    anyhow::bail!("no seeded food matching {fragment}")
}

#[test]
fn offer_request_accept_settles_both_sides() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let mailer = Arc::new(RecordingMailer::default());
    let service = new_service(&temp_dir, "accept.db", mailer.clone())?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;

    let offer = service
        .create_public_offer(&alice_session, &sandwich, Wanted::Anything)
        .context("posting the public offer")?;

    // a fresh public offer is pending, untargeted, and not a request
    assert_eq!(offer.status, TradeStatus::Pending);
    assert_eq!(offer.to_user, None);
    assert!(!offer.is_request);
    assert_eq!(offer.trade_date, "2025-03-20");
    assert_eq!(offer.trade_time, "12:30");

    let request = service
        .send_trade_request(&bob_session, &offer.id, &parfait)
        .context("sending the trade request")?;
    assert_eq!(request.status, TradeStatus::PendingRequest);

    // Alice is told in-app who wants what
    let alice_notes = service.notifications_for(&alice_session)?;
    assert_eq!(alice_notes.len(), 1);
    assert_eq!(alice_notes[0].kind, NotificationKind::TradeRequest);
    assert_eq!(
        alice_notes[0].message,
        "Bob wants to trade Greek Yogurt Parfait for your Grilled Chicken Sandwich"
    );

    let accepted = service
        .accept_trade_request(&alice_session, &request.id)
        .context("accepting the request")?;

    // both records settled together
    assert_eq!(accepted.status, TradeStatus::Accepted);
    let parent = service.store().require_transaction(&offer.id)?;
    assert_eq!(parent.status, TradeStatus::Taken);

    // Bob hears about it
    let bob_notes = service.notifications_for(&bob_session)?;
    assert!(
        bob_notes
            .iter()
            .any(|n| n.kind == NotificationKind::TradeAccepted
                && n.message == "Alice accepted your trade request")
    );

    // trade completion touched both counters
    assert_eq!(service.store().require_user(&alice.id)?.trades_completed, 1);
    assert_eq!(service.store().require_user(&bob.id)?.trades_completed, 1);

    // two welcome mails, then the request, then the acceptance
    let notices = mailer.notices();
    assert_eq!(notices.len(), 4);
    match notices.last() {
        Some(EmailNotice::TradeAccepted {
            to_email,
            food_name,
            ..
        }) => {
            assert_eq!(to_email, "bob@school.test");
            assert_eq!(food_name, "Grilled Chicken Sandwich");
        }
        other => panic!("expected a trade-accepted notice, got {other:?}"),
    }

    Ok(())
}

#[test]
fn decline_stores_the_reason_and_keeps_the_offer_open() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let mailer = Arc::new(RecordingMailer::default());
    let service = new_service(&temp_dir, "decline.db", mailer.clone())?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let cara = register(&service, "Cara", "11")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;
    let cara_session = service.session_for(&cara.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;
    let stir_fry = food_id(&service, "Stir Fry")?;

    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;
    let request = service.send_trade_request(&bob_session, &offer.id, &parfait)?;

    let declined = service.decline_trade_request(&alice_session, &request.id, Some("too far"))?;
    assert_eq!(declined.status, TradeStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some("too far"));

    // declining one request does not consume the offer
    let parent = service.store().require_transaction(&offer.id)?;
    assert_eq!(parent.status, TradeStatus::Pending);

    let bob_notes = service.notifications_for(&bob_session)?;
    let decline_note = bob_notes
        .iter()
        .find(|n| n.kind == NotificationKind::TradeDeclined)
        .expect("bob got the decline notification");
    assert!(decline_note.message.contains("too far"));

    match mailer.notices().last() {
        Some(EmailNotice::TradeDeclined { reason, .. }) => assert_eq!(reason, "too far"),
        other => panic!("expected a trade-declined notice, got {other:?}"),
    }

    // someone else can still answer the same offer
    let second = service.send_trade_request(&cara_session, &offer.id, &stir_fry)?;
    assert_eq!(second.status, TradeStatus::PendingRequest);

    // an empty reason falls back to the stock text
    let declined = service.decline_trade_request(&alice_session, &second.id, None)?;
    assert_eq!(declined.decline_reason.as_deref(), Some("No reason provided"));

    Ok(())
}

#[test]
fn cancel_is_owner_only_and_confirmed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "cancel.db", Arc::new(NullDispatch))?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;
    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;

    let err = service
        .cancel_offer(&bob_session, &offer.id, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = service
        .cancel_offer(&alice_session, &offer.id, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let cancelled = service.cancel_offer(&alice_session, &offer.id, true)?;
    assert_eq!(cancelled.status, TradeStatus::Cancelled);

    // a cancelled offer is no longer requestable
    let err = service
        .send_trade_request(&bob_session, &offer.id, &parfait)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // and cancelled is terminal
    let err = service
        .cancel_offer(&alice_session, &offer.id, true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    Ok(())
}

#[test]
fn requesting_your_own_offer_is_rejected() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "self_trade.db", Arc::new(NullDispatch))?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let alice_session = service.session_for(&alice.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;
    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;

    let err = service
        .send_trade_request(&alice_session, &offer.id, &parfait)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // nothing was written
    assert_eq!(service.trade_history(&alice.id)?.len(), 1);

    Ok(())
}

#[test]
fn competing_requests_leave_a_single_winner() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "race.db", Arc::new(NullDispatch))?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let cara = register(&service, "Cara", "11")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;
    let cara_session = service.session_for(&cara.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;
    let stir_fry = food_id(&service, "Stir Fry")?;

    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;

    // both answer before Alice decides; that race is allowed
    let from_bob = service.send_trade_request(&bob_session, &offer.id, &parfait)?;
    let from_cara = service.send_trade_request(&cara_session, &offer.id, &stir_fry)?;

    service.accept_trade_request(&alice_session, &from_bob.id)?;

    // the second accept must fail: the parent is already taken
    let err = service
        .accept_trade_request(&alice_session, &from_cara.id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    // and the failed accept left Cara's request untouched
    let stale = service.store().require_transaction(&from_cara.id)?;
    assert_eq!(stale.status, TradeStatus::PendingRequest);

    // which Alice resolves by declining
    let declined = service.decline_trade_request(&alice_session, &from_cara.id, None)?;
    assert_eq!(declined.status, TradeStatus::Declined);

    Ok(())
}

#[test]
fn trade_dates_are_snapshots_not_live_references() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "snapshot.db", Arc::new(NullDispatch))?;

    let admin = admin_session();
    service.seed_sample_foods(&admin)?;
    let alice = register(&service, "Alice", "9")?;
    let alice_session = service.session_for(&alice.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;

    // the admin moves the food to a new slot after the offer was posted
    let food = service.store().require_food(&sandwich)?;
    service.update_food(
        &admin,
        &sandwich,
        food_trade::food::NewFood {
            name: food.name.clone(),
            calories: food.calories,
            protein: food.protein,
            carbs: food.carbs,
            fat: food.fat,
            meal_type: food.meal_type,
            available_date: "2025-04-01".into(),
            available_time: "13:00".into(),
            allergy_warnings: food.allergy_warnings.clone(),
            nutrients_importance: food.nutrients_importance.clone(),
        },
    )?;

    let stored = service.store().require_transaction(&offer.id)?;
    assert_eq!(stored.trade_date, "2025-03-20");
    assert_eq!(stored.trade_time, "12:30");

    Ok(())
}

#[test]
fn listing_excludes_own_offers_and_applies_filters() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "listing.db", Arc::new(NullDispatch))?;

    let admin = admin_session();
    service.seed_sample_foods(&admin)?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;

    // proteins 25, 15, 30: the seeded sandwich plus two admin additions
    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;
    let burrito = service.add_food(
        &admin,
        food_trade::food::NewFood {
            name: "Bean Burrito".into(),
            calories: 420,
            protein: 30,
            carbs: 55,
            fat: 14,
            meal_type: food_trade::food::MealType::Lunch,
            available_date: "2025-03-21".into(),
            available_time: "12:00".into(),
            allergy_warnings: vec!["none".into()],
            nutrients_importance: "Plant protein and fiber".into(),
        },
    )?;

    service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;
    service.create_public_offer(&alice_session, &parfait, Wanted::Anything)?;
    service.create_public_offer(&alice_session, &burrito.id, Wanted::Anything)?;
    // Bob's own pending offer must never show up in his listing
    let stir_fry = food_id(&service, "Stir Fry")?;
    service.create_public_offer(&bob_session, &stir_fry, Wanted::Anything)?;

    let filters = OfferFilters {
        category: Some(Category::HighProtein),
        ..Default::default()
    };
    let mut names: Vec<String> = service
        .available_offers(&bob_session, filters)
        .map(|listing| listing.map(|l| l.food.name))
        .collect::<Result<_, _>>()?;
    names.sort();
    assert_eq!(names, ["Bean Burrito", "Grilled Chicken Sandwich"]);

    // no filters: everything that isn't Bob's
    let all: Vec<_> = service
        .available_offers(&bob_session, OfferFilters::default())
        .collect::<Result<_, _>>()?;
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|l| l.offer.from_user_id != bob.id));

    // the listing is restartable: a second walk sees the same offers
    let again: Vec<_> = service
        .available_offers(&bob_session, OfferFilters::default())
        .collect::<Result<_, _>>()?;
    assert_eq!(again.len(), all.len());

    Ok(())
}

#[test]
fn mail_backend_failures_never_block_the_lifecycle() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = new_service(&temp_dir, "mail_down.db", Arc::new(FailingMailer))?;

    service.seed_sample_foods(&admin_session())?;
    let alice = register(&service, "Alice", "9")?;
    let bob = register(&service, "Bob", "10")?;
    let alice_session = service.session_for(&alice.id)?;
    let bob_session = service.session_for(&bob.id)?;

    let sandwich = food_id(&service, "Chicken Sandwich")?;
    let parfait = food_id(&service, "Parfait")?;

    let offer = service.create_public_offer(&alice_session, &sandwich, Wanted::Anything)?;
    let request = service.send_trade_request(&bob_session, &offer.id, &parfait)?;
    let accepted = service.accept_trade_request(&alice_session, &request.id)?;

    assert_eq!(accepted.status, TradeStatus::Accepted);
    let parent = service.store().require_transaction(&offer.id)?;
    assert_eq!(parent.status, TradeStatus::Taken);

    // in-app notifications were still written
    assert_eq!(service.unread_count(&bob_session)?, 1);

    Ok(())
}
