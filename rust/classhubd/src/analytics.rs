use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{Gender, Poll, PollResponse, Student, SubmissionRecord};
use crate::polls::{effective_responses, StudentRef};
use crate::view::percent;

const RECENT_LIMIT: usize = 5;
const REPORT_PENDING_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_students: usize,
    pub submitted_count: usize,
    pub pending_count: usize,
    pub submission_rate: u32,
    pub boys_total: usize,
    pub girls_total: usize,
    pub boys_submitted: usize,
    pub girls_submitted: usize,
    pub boys_submission_rate: u32,
    pub girls_submission_rate: u32,
    pub total_polls: usize,
    pub avg_poll_responses: usize,
    pub submissions_today: usize,
}

fn submitted(submissions: &BTreeMap<String, SubmissionRecord>, register: &str) -> bool {
    submissions.get(register).is_some_and(|r| r.submitted())
}

fn response_count(poll: &Poll, responses: &BTreeMap<String, PollResponse>) -> usize {
    effective_responses(poll, responses.values()).len()
}

fn rounded_div(sum: usize, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (sum * 2 + n) / (2 * n)
}

/// The overall submitted count runs over all records, including registers
/// that are not on the roster; gender splits only count roster students.
pub fn summary(
    roster: &[Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
    polls: &[Poll],
    responses: &BTreeMap<String, PollResponse>,
    now: DateTime<Utc>,
) -> Summary {
    let total_students = roster.len();
    let submitted_count = submissions.values().filter(|r| r.submitted()).count();
    let count_gender = |g: Gender| roster.iter().filter(|s| s.gender == g).count();
    let count_submitted = |g: Gender| {
        roster
            .iter()
            .filter(|s| s.gender == g && submitted(submissions, &s.register))
            .count()
    };
    let boys_total = count_gender(Gender::Male);
    let girls_total = count_gender(Gender::Female);
    let boys_submitted = count_submitted(Gender::Male);
    let girls_submitted = count_submitted(Gender::Female);
    let total_responses: usize = polls.iter().map(|p| response_count(p, responses)).sum();
    let today = now.date_naive();

    Summary {
        total_students,
        submitted_count,
        pending_count: total_students.saturating_sub(submitted_count),
        submission_rate: percent(submitted_count, total_students),
        boys_total,
        girls_total,
        boys_submitted,
        girls_submitted,
        boys_submission_rate: percent(boys_submitted, boys_total),
        girls_submission_rate: percent(girls_submitted, girls_total),
        total_polls: polls.len(),
        avg_poll_responses: rounded_div(total_responses, polls.len()),
        submissions_today: submissions
            .values()
            .filter_map(|r| r.timestamp())
            .filter(|t| t.date_naive() == today)
            .count(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStat {
    pub question: String,
    pub responses: usize,
    pub completion_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detailed {
    #[serde(flatten)]
    pub summary: Summary,
    pub recent_submissions: Vec<String>,
    pub pending_students: Vec<StudentRef>,
    pub poll_stats: Vec<PollStat>,
}

pub fn detailed(
    roster: &[Student],
    submissions: &BTreeMap<String, SubmissionRecord>,
    polls: &[Poll],
    responses: &BTreeMap<String, PollResponse>,
    now: DateTime<Utc>,
) -> Detailed {
    let mut timed: Vec<(&String, DateTime<Utc>)> = submissions
        .iter()
        .filter(|(_, r)| r.submitted())
        .filter_map(|(k, r)| r.timestamp().map(|t| (k, t)))
        .collect();
    timed.sort_by(|a, b| b.1.cmp(&a.1));
    let recent_submissions = timed
        .into_iter()
        .take(RECENT_LIMIT)
        .map(|(register, _)| {
            roster
                .iter()
                .find(|s| &s.register == register)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| register.clone())
        })
        .collect();

    let pending_students = roster
        .iter()
        .filter(|s| !submitted(submissions, &s.register))
        .map(StudentRef::from)
        .collect();

    let poll_stats = polls
        .iter()
        .map(|p| {
            let count = response_count(p, responses);
            PollStat {
                question: p.question.clone(),
                responses: count,
                completion_rate: percent(count, roster.len()),
            }
        })
        .collect();

    Detailed {
        summary: summary(roster, submissions, polls, responses, now),
        recent_submissions,
        pending_students,
        poll_stats,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenderStats {
    pub total: usize,
    pub submitted: usize,
    pub pending: usize,
    pub rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Leader {
    Boys,
    Girls,
    Tied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenderComparison {
    pub boys: GenderStats,
    pub girls: GenderStats,
    pub difference: u32,
    pub leader: Leader,
}

pub fn gender_comparison(s: &Summary) -> GenderComparison {
    let boys = GenderStats {
        total: s.boys_total,
        submitted: s.boys_submitted,
        pending: s.boys_total - s.boys_submitted,
        rate: s.boys_submission_rate,
    };
    let girls = GenderStats {
        total: s.girls_total,
        submitted: s.girls_submitted,
        pending: s.girls_total - s.girls_submitted,
        rate: s.girls_submission_rate,
    };
    let leader = match boys.rate.cmp(&girls.rate) {
        std::cmp::Ordering::Greater => Leader::Boys,
        std::cmp::Ordering::Less => Leader::Girls,
        std::cmp::Ordering::Equal => Leader::Tied,
    };
    GenderComparison {
        boys,
        girls,
        difference: boys.rate.abs_diff(girls.rate),
        leader,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    #[serde(rename = "No data")]
    NoData,
    Increasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHour {
    pub hour: u32,
    pub count: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionTrend {
    pub trend: TrendDirection,
    pub peak_hour: Option<PeakHour>,
    pub last24_hours: usize,
    pub total_submissions: usize,
}

/// Hours are UTC. On a tie the earliest hour is the peak.
pub fn trend(submissions: &BTreeMap<String, SubmissionRecord>, now: DateTime<Utc>) -> SubmissionTrend {
    let stamps: Vec<DateTime<Utc>> = submissions
        .values()
        .filter(|r| r.submitted())
        .filter_map(|r| r.timestamp())
        .collect();
    if stamps.is_empty() {
        return SubmissionTrend {
            trend: TrendDirection::NoData,
            peak_hour: None,
            last24_hours: 0,
            total_submissions: 0,
        };
    }

    let mut by_hour: BTreeMap<u32, usize> = BTreeMap::new();
    for t in &stamps {
        *by_hour.entry(t.hour()).or_default() += 1;
    }
    let mut peak: Option<(u32, usize)> = None;
    for (&hour, &count) in &by_hour {
        if peak.map_or(true, |(_, best)| count > best) {
            peak = Some((hour, count));
        }
    }
    let peak_hour = peak.map(|(hour, count)| PeakHour {
        hour,
        count,
        label: format!("{}:00 ({} submissions)", hour, count),
    });

    let window = Duration::hours(24);
    let last24_hours = stamps.iter().filter(|t| now - **t < window).count();
    let total = stamps.len();
    SubmissionTrend {
        trend: if last24_hours * 2 > total {
            TrendDirection::Increasing
        } else {
            TrendDirection::Stable
        },
        peak_hour,
        last24_hours,
        total_submissions: total,
    }
}

pub fn report(d: &Detailed, now: DateTime<Utc>) -> String {
    let s = &d.summary;
    let rule = "-".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "CLASSHUB ANALYTICS REPORT");
    let _ = writeln!(out, "Generated: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out);

    let _ = writeln!(out, "SUBMISSION STATISTICS\n{}", rule);
    let _ = writeln!(out, "{:<29}{}", "Total Students:", s.total_students);
    let _ = writeln!(out, "{:<29}{}", "Submitted:", s.submitted_count);
    let _ = writeln!(out, "{:<29}{}", "Pending:", s.pending_count);
    let _ = writeln!(out, "{:<29}{}%", "Overall Submission Rate:", s.submission_rate);
    let _ = writeln!(out, "{:<29}{}", "Submissions Today:", s.submissions_today);
    let _ = writeln!(out);

    let _ = writeln!(out, "BOYS STATISTICS\n{}", rule);
    let _ = writeln!(out, "{:<29}{}", "Total Boys:", s.boys_total);
    let _ = writeln!(out, "{:<29}{}", "Boys Submitted:", s.boys_submitted);
    let _ = writeln!(out, "{:<29}{}%", "Boys Submission Rate:", s.boys_submission_rate);
    let _ = writeln!(out);

    let _ = writeln!(out, "GIRLS STATISTICS\n{}", rule);
    let _ = writeln!(out, "{:<29}{}", "Total Girls:", s.girls_total);
    let _ = writeln!(out, "{:<29}{}", "Girls Submitted:", s.girls_submitted);
    let _ = writeln!(out, "{:<29}{}%", "Girls Submission Rate:", s.girls_submission_rate);
    let _ = writeln!(out);

    let _ = writeln!(out, "POLL STATISTICS\n{}", rule);
    let _ = writeln!(out, "{:<29}{}", "Active Polls:", s.total_polls);
    let _ = writeln!(out, "{:<29}{}", "Avg Poll Responses:", s.avg_poll_responses);
    if !d.poll_stats.is_empty() {
        let _ = writeln!(out, "\nPOLL BREAKDOWN:");
        for p in &d.poll_stats {
            let _ = writeln!(out, "  * {}", p.question);
            let _ = writeln!(
                out,
                "    Responses: {}/{} ({}%)",
                p.responses, s.total_students, p.completion_rate
            );
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "PENDING STUDENTS ({})\n{}", d.pending_students.len(), rule);
    if d.pending_students.is_empty() {
        let _ = writeln!(out, "  All students have submitted!");
    } else {
        for p in d.pending_students.iter().take(REPORT_PENDING_LIMIT) {
            let _ = writeln!(out, "  * {} - {}", p.register, p.name);
        }
        if d.pending_students.len() > REPORT_PENDING_LIMIT {
            let _ = writeln!(out, "  ... and {} more", d.pending_students.len() - REPORT_PENDING_LIMIT);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PollAnswer;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0).unwrap()
    }

    fn roster(n: usize) -> Vec<Student> {
        (0..n)
            .map(|i| Student {
                register: format!("R{:02}", i),
                name: format!("Student {}", i),
                gender: if i % 2 == 0 { Gender::Male } else { Gender::Female },
            })
            .collect()
    }

    fn submit(map: &mut BTreeMap<String, SubmissionRecord>, reg: &str, t: DateTime<Utc>) {
        map.insert(reg.to_string(), SubmissionRecord::new(reg, true, t));
    }

    #[test]
    fn summary_counts_and_rates() {
        let roster = roster(4);
        let mut subs = BTreeMap::new();
        submit(&mut subs, "R00", at(21, 8));
        submit(&mut subs, "R01", at(20, 8));
        submit(&mut subs, "R02", at(21, 9));
        subs.insert("R03".into(), SubmissionRecord::new("R03", false, at(21, 9)));
        let s = summary(&roster, &subs, &[], &BTreeMap::new(), at(21, 12));
        assert_eq!(s.submitted_count, 3);
        assert_eq!(s.pending_count, 1);
        assert_eq!(s.submission_rate, 75);
        assert_eq!((s.boys_submitted, s.boys_submission_rate), (2, 100));
        assert_eq!((s.girls_submitted, s.girls_submission_rate), (1, 50));
        assert_eq!(s.submissions_today, 2);
        assert_eq!(s.avg_poll_responses, 0);

        let cmp = gender_comparison(&s);
        assert_eq!(cmp.leader, Leader::Boys);
        assert_eq!(cmp.difference, 50);
        assert_eq!(cmp.girls.pending, 1);
    }

    #[test]
    fn trend_without_submissions_has_no_data() {
        let t = trend(&BTreeMap::new(), at(21, 12));
        assert_eq!(t.trend, TrendDirection::NoData);
        assert!(t.peak_hour.is_none());
        assert_eq!(serde_json::to_value(t.trend).unwrap(), "No data");
    }

    #[test]
    fn trend_picks_busiest_hour_and_direction() {
        let mut subs = BTreeMap::new();
        submit(&mut subs, "R00", at(21, 9));
        submit(&mut subs, "R01", at(21, 9));
        submit(&mut subs, "R02", at(10, 14));
        let t = trend(&subs, at(21, 12));
        let peak = t.peak_hour.expect("peak");
        assert_eq!((peak.hour, peak.count), (9, 2));
        assert_eq!(peak.label, "9:00 (2 submissions)");
        assert_eq!(t.last24_hours, 2);
        assert_eq!(t.trend, TrendDirection::Increasing);
    }

    #[test]
    fn poll_stats_count_standalone_responses() {
        let roster = roster(4);
        let poll = Poll {
            id: "poll_1".into(),
            question: "Lab on Friday?".into(),
            options: PollAnswer::all(),
            responses: BTreeMap::from([("R00".to_string(), PollAnswer::Yes)]),
            created_at: at(20, 9),
            active: true,
        };
        let mut responses = BTreeMap::new();
        for (reg, answer) in [("R00", PollAnswer::No), ("R01", PollAnswer::No), ("R02", PollAnswer::Yes)] {
            let r = PollResponse {
                poll_id: "poll_1".into(),
                register_number: reg.into(),
                response: answer,
                timestamp: Some(at(21, 9)),
            };
            responses.insert(r.key(), r);
        }
        let d = detailed(&roster, &BTreeMap::new(), &[poll], &responses, at(21, 12));
        assert_eq!(d.poll_stats[0].responses, 3);
        assert_eq!(d.poll_stats[0].completion_rate, 75);
        assert_eq!(d.summary.avg_poll_responses, 3);
    }

    #[test]
    fn report_truncates_pending_list() {
        let roster = roster(13);
        let d = detailed(&roster, &BTreeMap::new(), &[], &BTreeMap::new(), at(21, 12));
        let text = report(&d, at(21, 12));
        assert!(text.contains("PENDING STUDENTS (13)"));
        assert!(text.contains("  * R09 - Student 9"));
        assert!(!text.contains("R10 - "));
        assert!(text.contains("... and 3 more"));
    }

    #[test]
    fn recent_submitters_fall_back_to_register() {
        let roster = roster(2);
        let mut subs = BTreeMap::new();
        submit(&mut subs, "R00", at(21, 8));
        submit(&mut subs, "GHOST", at(21, 10));
        let d = detailed(&roster, &subs, &[], &BTreeMap::new(), at(21, 12));
        assert_eq!(d.recent_submissions, vec!["GHOST".to_string(), "Student 0".to_string()]);
        assert_eq!(d.pending_students.len(), 1);
    }
}
