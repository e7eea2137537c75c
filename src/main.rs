//! Command-line front end: prints a crew's upcoming schedule, including any
//! locally stored overrides.

use std::sync::Arc;

use chrono::Duration;

use crewcal::identity::{Identity, IdentityHub};
use crewcal::remote::MemoryDocumentStore;
use crewcal::schedule::Schedule;
use crewcal::store::ModificationStore;
use crewcal::types::Crew;
use crewcal::LocalStore;

/// Days of schedule to print.
const DAYS_AHEAD: i64 = 14;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let crew = match std::env::args().nth(1) {
        Some(name) => match Crew::from_name(&name) {
            Some(crew) => crew,
            None => {
                eprintln!("Unknown crew '{}'. Expected: david, trevor, paddy.", name);
                std::process::exit(1);
            }
        },
        None => Crew::David,
    };

    let local = match LocalStore::open_default() {
        Ok(local) => local,
        Err(e) => {
            eprintln!("Failed to open local store: {}", e);
            std::process::exit(1);
        }
    };

    // Local-only session: no remote backend, anonymous identity.
    let hub = IdentityHub::new();
    let store = ModificationStore::new(local, Arc::new(MemoryDocumentStore::new()), hub.watch());
    tokio::spawn(Arc::clone(&store).run());
    hub.set_identity(Identity::Anonymous);

    let schedule = Schedule::new(Arc::clone(&store));
    let today = chrono::Local::now().date_naive();
    let config = crew.config();

    println!("{} — next {} days", config.display_name, DAYS_AHEAD);
    for offset in 0..DAYS_AHEAD {
        let date = today + Duration::days(offset);
        let day = schedule.shift_day(date, crew).await;

        let mut markers = String::new();
        if day.is_holiday {
            markers.push_str("  [holiday]");
        }
        if day.is_modified {
            markers.push_str("  [modified]");
        }
        println!(
            "{}  {} {:<13}{}",
            day.date.format("%Y-%m-%d"),
            day.date.format("%a"),
            day.shift_type.label(),
            markers
        );
    }

    let leave = schedule
        .annual_leave_usage(crew, chrono::Datelike::year(&today))
        .await;
    println!(
        "\nAnnual leave used this year: {}/{}",
        leave,
        crewcal::types::ANNUAL_LEAVE_LIMIT
    );
}
