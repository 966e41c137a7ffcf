use chrono::{TimeZone, Utc};
use classhubd::analytics;
use classhubd::model::{Gender, PollAnswer, Student};
use classhubd::polls;
use classhubd::roster::Roster;
use classhubd::store::MemoryStore;
use classhubd::sync::SyncCoordinator;
use classhubd::view::{self, GenderFilter, SortKey, SubmissionFilter, ViewPrefs};

fn roster() -> Roster {
    Roster::new(vec![
        Student {
            register: "R1".into(),
            name: "Arun".into(),
            gender: Gender::Male,
        },
        Student {
            register: "R2".into(),
            name: "Bhavya".into(),
            gender: Gender::Female,
        },
        Student {
            register: "R3".into(),
            name: "Charan".into(),
            gender: Gender::Male,
        },
    ])
    .expect("roster")
}

#[tokio::test]
async fn submitting_one_boy_shows_up_in_the_boys_view() {
    let roster = roster();
    let mut coord = SyncCoordinator::new(Box::new(MemoryStore::new()), None);
    coord
        .set_submitted("R1", true, Utc::now())
        .expect("submit R1");

    let prefs = ViewPrefs {
        gender: GenderFilter::Male,
        submission: SubmissionFilter::All,
        sort_by: SortKey::Register,
    };
    let list = view::derive(roster.students(), coord.submissions(), &prefs);
    let registers: Vec<&str> = list.iter().map(|s| s.register.as_str()).collect();
    assert_eq!(registers, vec!["R1", "R3"]);

    let subs = coord.submissions();
    assert!(subs["R1"].timestamp().is_some());
    assert!(subs.get("R3").and_then(|r| r.timestamp()).is_none());

    let stats = view::filtered_stats(&list, subs);
    assert_eq!((stats.total, stats.submitted, stats.submission_rate), (2, 1, 50));
}

#[tokio::test]
async fn poll_lifecycle_against_the_roster() {
    let roster = roster();
    let mut coord = SyncCoordinator::new(Box::new(MemoryStore::new()), None);
    let now = Utc.with_ymd_and_hms(2026, 1, 21, 9, 0, 0).unwrap();

    let empty = coord.create_poll("   ", now).expect_err("blank question");
    assert_eq!(empty.code(), "validation_failed");

    let (first, _) = coord.create_poll("  Lab on Friday? ", now).expect("first poll");
    let (second, _) = coord.create_poll("Bring laptops?", now).expect("second poll");
    assert_eq!(first.question, "Lab on Friday?");
    assert_eq!(first.id, format!("poll_{}", now.timestamp_millis()));
    assert_eq!(second.id, format!("poll_{}", now.timestamp_millis() + 1));
    assert_eq!(coord.polls()[0].id, second.id, "newest poll first");

    coord
        .respond(&first.id, "R1", PollAnswer::Yes, now)
        .expect("R1 answers");
    coord
        .respond(&first.id, "R2", PollAnswer::No, now)
        .expect("R2 answers");
    coord
        .respond(&first.id, "R2", PollAnswer::Yes, now)
        .expect("R2 changes answer");
    assert!(coord
        .respond("poll_missing", "R1", PollAnswer::Yes, now)
        .is_err());

    let poll = coord.poll(&first.id).expect("poll exists");
    let answers = polls::effective_responses(poll, coord.poll_responses().values());
    let results = polls::results(poll, &answers, roster.students());
    assert_eq!((results.yes_count, results.no_count), (2, 0));
    assert_eq!(results.pending.len(), 1);
    assert_eq!(results.pending[0].register, "R3");

    let summary = analytics::summary(
        roster.students(),
        coord.submissions(),
        coord.polls(),
        coord.poll_responses(),
        now,
    );
    assert_eq!(summary.total_polls, 2);
    assert_eq!(summary.avg_poll_responses, 1);

    let detailed = analytics::detailed(
        roster.students(),
        coord.submissions(),
        coord.polls(),
        coord.poll_responses(),
        now,
    );
    assert_eq!(detailed.poll_stats.len(), 2);
    assert_eq!(detailed.pending_students.len(), 3);
}
