//! End-to-end walkthrough of the marketplace lifecycle against a local sled
//! database. Set FOOD_TRADE_MAIL_URL to also exercise the HTTP mail backend;
//! without it, email notices are discarded.

use std::sync::Arc;

use food_trade::{
    dispatch::{EmailDispatch, HttpDispatch, NullDispatch},
    food::{Category, OfferFilters},
    service::TradeService,
    session::{AuthHandle, Session},
    trade::Wanted,
    utils,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let dir = tempfile::tempdir()?;
    let db = sled::open(dir.path().join("marketplace.db"))?;

    let mailer: Arc<dyn EmailDispatch> = match std::env::var("FOOD_TRADE_MAIL_URL") {
        Ok(url) => Arc::new(HttpDispatch::new(url)?),
        Err(_) => Arc::new(NullDispatch),
    };
    let service = TradeService::new(Arc::new(db), mailer)?;

    // two students sign up through the external identity provider
    let alice = service.register_user(
        &AuthHandle {
            uid: utils::new_uuid_to_bech32("user_")?,
            email: "alice@school.test".into(),
        },
        "Alice Tran",
        "alice",
        "9",
    )?;
    let bob = service.register_user(
        &AuthHandle {
            uid: utils::new_uuid_to_bech32("user_")?,
            email: "bob@school.test".into(),
        },
        "Bob Mensah",
        "bob",
        "10",
    )?;

    // the admin session comes from the auth layer; here we just forge one to
    // seed the catalog
    let admin = Session {
        user_id: utils::new_uuid_to_bech32("user_")?,
        is_admin: true,
    };
    let seeded = service.seed_sample_foods(&admin)?;
    println!("seeded {seeded} sample foods");

    let foods: Vec<_> = service.foods().collect::<Result<_, _>>()?;
    let sandwich = foods
        .iter()
        .find(|f| f.name.contains("Chicken"))
        .expect("sample catalog has the sandwich");
    let parfait = foods
        .iter()
        .find(|f| f.name.contains("Parfait"))
        .expect("sample catalog has the parfait");

    // Alice posts a public offer, negotiable
    let alice_session = service.session_for(&alice.id)?;
    let offer = service.create_public_offer(&alice_session, &sandwich.id, Wanted::Anything)?;
    println!(
        "Alice offers {} at {} on {}",
        sandwich.name, offer.trade_time, offer.trade_date
    );

    // Bob browses high-protein offers and answers with his parfait
    let bob_session = service.session_for(&bob.id)?;
    let filters = OfferFilters {
        category: Some(Category::HighProtein),
        ..Default::default()
    };
    for listing in service.available_offers(&bob_session, filters) {
        let listing = listing?;
        println!(
            "Bob sees: {} ({} cal) from {}",
            listing.food.name, listing.food.calories, listing.offer.from_user_id
        );
    }
    let request = service.send_trade_request(&bob_session, &offer.id, &parfait.id)?;

    // Alice accepts; the request and her offer settle together
    let accepted = service.accept_trade_request(&alice_session, &request.id)?;
    println!("request is now {}", accepted.status);

    // Bob rates the exchange
    service.rate_trade(&bob_session, &accepted.id, 5, "Great sandwich, on time")?;

    for entry in service.trade_history(&bob.id)? {
        println!(
            "history: {:?} {} ({})",
            entry.direction,
            entry
                .offered_food
                .map(|f| f.name)
                .unwrap_or_else(|| "unknown food".into()),
            entry.transaction.status
        );
    }

    for note in service.notifications_for(&bob_session)? {
        println!("notification for Bob [{}]: {}", note.kind, note.message);
    }

    Ok(())
}
