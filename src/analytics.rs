// src/analytics.rs

//! Read-only rollups over attempt records.
//!
//! Every function here is pure: handlers fetch `AttemptRecord`s (and the
//! classes, quizzes or users they need) from the store and pass them in.
//! An empty input is a zero-state, never an error.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    str::FromStr,
};

use chrono::{DateTime, Duration, Months, Utc};

use crate::models::{
    attempt::AttemptRecord,
    class::Class,
    quiz::Quiz,
    stats::{
        Analytics, ClassPerformance, ClassRef, ClassStudent, LeaderboardEntry, QuizStats,
        RecentAttempt, ScoreLine, ScoreSummary, StudentClassPerformance, StudentDashboard,
        StudentDetail, StudentDetailStats, StudentOverview, StudentQuizStats, StudentTotals,
        TeacherDashboard, TeacherQuizItem, TeacherTotals, TopPerformer, UpcomingQuiz,
    },
    user::{Role, User, display_name},
};

pub const RECENT_LIMIT: usize = 10;
pub const CLASS_RECENT_LIMIT: usize = 5;
pub const TOP_PERFORMERS_LIMIT: usize = 5;
pub const LEADERBOARD_RECENT_SCORES: usize = 5;
pub const UPCOMING_LIMIT: usize = 6;

/// `round(100 * score / max)`, or 0 when there is nothing to score against.
pub fn percentage(score: i64, max: i64) -> i64 {
    if max <= 0 {
        return 0;
    }
    (score as f64 * 100.0 / max as f64).round() as i64
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a AttemptRecord>) -> ScoreSummary {
    let mut summary = ScoreSummary::default();
    for r in records {
        summary.attempts += 1;
        summary.total_score += i64::from(r.score);
        summary.total_max_score += i64::from(r.max_score);
    }
    summary.average_score = percentage(summary.total_score, summary.total_max_score);
    summary
}

fn newest_first<'a>(records: impl IntoIterator<Item = &'a AttemptRecord>) -> Vec<&'a AttemptRecord> {
    let mut sorted: Vec<&AttemptRecord> = records.into_iter().collect();
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.attempt_id.cmp(&a.attempt_id))
    });
    sorted
}

fn recent_attempt(r: &AttemptRecord) -> RecentAttempt {
    RecentAttempt {
        attempt_id: r.attempt_id,
        user_id: r.user_id,
        student_name: display_name(r.student_name.as_deref(), &r.student_email),
        quiz_id: r.quiz_id,
        quiz_title: r.quiz_title.clone(),
        class_id: r.class_id,
        class_name: r.class_name.clone(),
        score: r.score,
        max_score: r.max_score,
        percentage: percentage(i64::from(r.score), i64::from(r.max_score)),
        created_at: r.created_at,
    }
}

fn score_line(r: &AttemptRecord) -> ScoreLine {
    ScoreLine {
        quiz_id: r.quiz_id,
        quiz_title: r.quiz_title.clone(),
        score: r.score,
        max_score: r.max_score,
        created_at: r.created_at,
    }
}

/// The `limit` most recent attempts.
pub fn recent<'a>(
    records: impl IntoIterator<Item = &'a AttemptRecord>,
    limit: usize,
) -> Vec<RecentAttempt> {
    newest_first(records)
        .into_iter()
        .take(limit)
        .map(recent_attempt)
        .collect()
}

/// A student's rollup, the unit of every ranking.
#[derive(Debug, Clone)]
pub struct Standing {
    pub user_id: i64,
    pub name: String,
    pub summary: ScoreSummary,
}

/// Average desc, then total score desc, then name asc, then id asc.
fn by_rank(a: &Standing, b: &Standing) -> Ordering {
    b.summary
        .average_score
        .cmp(&a.summary.average_score)
        .then(b.summary.total_score.cmp(&a.summary.total_score))
        .then_with(|| a.name.cmp(&b.name))
        .then(a.user_id.cmp(&b.user_id))
}

/// One `Standing` per student that appears in `records`, best first.
/// Attempts of accounts that are no longer students are left out.
pub fn standings(records: &[AttemptRecord]) -> Vec<Standing> {
    let mut grouped: BTreeMap<i64, Vec<&AttemptRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.student_role == Role::Student) {
        grouped.entry(r.user_id).or_default().push(r);
    }

    let mut out: Vec<Standing> = grouped
        .into_iter()
        .map(|(user_id, rows)| {
            let first = rows[0];
            Standing {
                user_id,
                name: display_name(first.student_name.as_deref(), &first.student_email),
                summary: summarize(rows),
            }
        })
        .collect();
    out.sort_by(by_rank);
    out
}

/// Leaderboard window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Timeframe {
    #[default]
    All,
    Month,
    Week,
}

impl Timeframe {
    /// Earliest attempt time included, `None` for no lower bound.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::All => None,
            Timeframe::Month => now.checked_sub_months(Months::new(1)),
            Timeframe::Week => Some(now - Duration::days(7)),
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Timeframe::All),
            "month" => Ok(Timeframe::Month),
            "week" => Ok(Timeframe::Week),
            other => Err(format!(
                "Unknown timeframe '{}', expected all, month or week",
                other
            )),
        }
    }
}

pub fn leaderboard(
    records: &[AttemptRecord],
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let since = timeframe.since(now);
    let window: Vec<AttemptRecord> = records
        .iter()
        .filter(|r| since.is_none_or(|t| r.created_at >= t))
        .cloned()
        .collect();

    let mut lines: HashMap<i64, Vec<ScoreLine>> = HashMap::new();
    for r in newest_first(&window) {
        let entry = lines.entry(r.user_id).or_default();
        if entry.len() < LEADERBOARD_RECENT_SCORES {
            entry.push(score_line(r));
        }
    }

    standings(&window)
        .into_iter()
        .enumerate()
        .map(|(i, s)| LeaderboardEntry {
            rank: i + 1,
            user_id: s.user_id,
            recent_scores: lines.remove(&s.user_id).unwrap_or_default(),
            student_name: s.name,
            total_score: s.summary.total_score,
            total_max_score: s.summary.total_max_score,
            average_score: s.summary.average_score,
            quizzes_taken: s.summary.attempts,
        })
        .collect()
}

pub fn quiz_stats(quiz: &Quiz, records: &[AttemptRecord]) -> QuizStats {
    let own: Vec<&AttemptRecord> = records.iter().filter(|r| r.quiz_id == quiz.id).collect();
    let summary = summarize(own.iter().copied());
    QuizStats {
        total_questions: quiz.questions.len(),
        total_attempts: summary.attempts,
        average_score: summary.average_score,
        recent_attempt: recent(own, 1).into_iter().next(),
    }
}

/// Rows of the teacher's quiz overview, in the order of `quizzes`.
pub fn teacher_quizzes(
    quizzes: &[Quiz],
    classes: &[Class],
    records: &[AttemptRecord],
) -> Vec<TeacherQuizItem> {
    let names: HashMap<i64, &str> = classes.iter().map(|c| (c.id, c.name.as_str())).collect();
    quizzes
        .iter()
        .map(|q| TeacherQuizItem {
            id: q.id,
            title: q.title.clone(),
            class_id: q.class_id,
            class_name: names.get(&q.class_id).copied().unwrap_or_default().to_string(),
            time_limit: q.time_limit,
            created_at: q.created_at,
            stats: quiz_stats(q, records),
        })
        .collect()
}

pub fn class_performance(
    class: &Class,
    total_quizzes: usize,
    records: &[AttemptRecord],
) -> ClassPerformance {
    let summary = summarize(records.iter().filter(|r| r.class_id == class.id));
    ClassPerformance {
        class_id: class.id,
        class_name: class.name.clone(),
        total_students: class.student_ids.len(),
        total_quizzes,
        total_attempts: summary.attempts,
        average_score: summary.average_score,
    }
}

fn quizzes_per_class(quizzes: &[Quiz]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for q in quizzes {
        *counts.entry(q.class_id).or_insert(0) += 1;
    }
    counts
}

/// Top students of a teacher's classes. `records` must already be limited
/// to the teacher's quizzes.
pub fn top_performers(classes: &[Class], records: &[AttemptRecord]) -> Vec<TopPerformer> {
    standings(records)
        .into_iter()
        .take(TOP_PERFORMERS_LIMIT)
        .map(|s| {
            let joined: Vec<&str> = classes
                .iter()
                .filter(|c| c.student_ids.contains(&s.user_id))
                .map(|c| c.name.as_str())
                .collect();
            let class_name = match joined.as_slice() {
                [only] => only.to_string(),
                _ => "Multiple Classes".to_string(),
            };
            TopPerformer {
                user_id: s.user_id,
                student_name: s.name,
                class_name,
                average_score: s.summary.average_score,
                total_score: s.summary.total_score,
            }
        })
        .collect()
}

pub fn teacher_dashboard(
    classes: &[Class],
    total_quizzes: usize,
    records: &[AttemptRecord],
) -> TeacherDashboard {
    let students: HashSet<i64> = classes
        .iter()
        .flat_map(|c| c.student_ids.iter().copied())
        .collect();

    TeacherDashboard {
        stats: TeacherTotals {
            total_students: students.len(),
            total_classes: classes.len(),
            total_quizzes,
            average_score: summarize(records).average_score,
        },
        recent_activity: recent(records, RECENT_LIMIT),
        top_performers: top_performers(classes, records),
    }
}

/// Dashboard of one student.
///
/// * `joined` and `quizzes` are the student's classes and their quizzes.
/// * `all_records` are every attempt on the platform; the global rank is
///   `1 + ` the number of ranked students with a strictly higher average.
pub fn student_dashboard(
    student_id: i64,
    joined: &[Class],
    quizzes: &[Quiz],
    all_records: &[AttemptRecord],
) -> StudentDashboard {
    let own: Vec<&AttemptRecord> = all_records
        .iter()
        .filter(|r| r.user_id == student_id)
        .collect();
    let summary = summarize(own.iter().copied());

    let ranked = standings(all_records);
    let rank = 1 + ranked
        .iter()
        .filter(|s| s.user_id != student_id && s.summary.average_score > summary.average_score)
        .count();

    let per_class = quizzes_per_class(quizzes);
    let performance_by_class = joined
        .iter()
        .map(|c| {
            let class_summary = summarize(own.iter().copied().filter(|r| r.class_id == c.id));
            StudentClassPerformance {
                class_id: c.id,
                class_name: c.name.clone(),
                average_score: class_summary.average_score,
                completed_quizzes: class_summary.attempts,
                total_quizzes: per_class.get(&c.id).copied().unwrap_or(0),
            }
        })
        .collect();

    let taken: HashSet<i64> = own.iter().map(|r| r.quiz_id).collect();
    let names: HashMap<i64, &str> = joined.iter().map(|c| (c.id, c.name.as_str())).collect();
    let upcoming_quizzes = quizzes
        .iter()
        .filter(|q| !q.questions.is_empty() && !taken.contains(&q.id))
        .take(UPCOMING_LIMIT)
        .map(|q| UpcomingQuiz {
            id: q.id,
            class_id: q.class_id,
            title: q.title.clone(),
            class_name: names.get(&q.class_id).copied().unwrap_or_default().to_string(),
            total_questions: q.questions.len(),
            time_limit: q.time_limit,
        })
        .collect();

    StudentDashboard {
        stats: StudentTotals {
            total_classes: joined.len(),
            quizzes_completed: summary.attempts,
            average_score: summary.average_score,
            rank,
            total_students_in_rank: ranked.len(),
        },
        recent_activity: recent(own, RECENT_LIMIT),
        performance_by_class,
        upcoming_quizzes,
    }
}

/// Teacher analytics. `platform_students` counts every STUDENT account.
pub fn analytics(
    platform_students: usize,
    classes: &[Class],
    quizzes: &[Quiz],
    records: &[AttemptRecord],
) -> Analytics {
    let per_class = quizzes_per_class(quizzes);
    Analytics {
        total_students: platform_students,
        total_quizzes: quizzes.len(),
        total_attempts: records.len(),
        average_score: summarize(records).average_score,
        class_performance: classes
            .iter()
            .map(|c| class_performance(c, per_class.get(&c.id).copied().unwrap_or(0), records))
            .collect(),
        recent_scores: recent(records, RECENT_LIMIT),
    }
}

/// Students enrolled in any of `classes`, with their results on those
/// classes' quizzes only.
pub fn students_overview(
    classes: &[Class],
    students: &[User],
    records: &[AttemptRecord],
) -> Vec<StudentOverview> {
    students
        .iter()
        .map(|s| {
            let own: Vec<&AttemptRecord> = records.iter().filter(|r| r.user_id == s.id).collect();
            let summary = summarize(own.iter().copied());
            StudentOverview {
                id: s.id,
                name: s.name.clone(),
                email: s.email.clone(),
                enrolled_classes: classes
                    .iter()
                    .filter(|c| c.is_member(s))
                    .map(|c| ClassRef {
                        id: c.id,
                        name: c.name.clone(),
                    })
                    .collect(),
                quiz_stats: StudentQuizStats {
                    total_attempts: summary.attempts,
                    average_score: summary.average_score,
                    recent_score: newest_first(own).first().map(|r| score_line(r)),
                },
            }
        })
        .collect()
}

/// Detail of one student, limited to the teacher's classes and quizzes.
pub fn student_detail(
    student: &User,
    classes: &[Class],
    quizzes: &[Quiz],
    records: &[AttemptRecord],
) -> StudentDetail {
    let own: Vec<&AttemptRecord> = records
        .iter()
        .filter(|r| r.user_id == student.id)
        .collect();
    let summary = summarize(own.iter().copied());
    let per_attempt: Vec<i64> = own
        .iter()
        .map(|r| percentage(i64::from(r.score), i64::from(r.max_score)))
        .collect();

    let per_class = quizzes_per_class(quizzes);
    let enrolled_classes = classes
        .iter()
        .filter(|c| c.is_member(student))
        .map(|c| {
            let class_summary = summarize(own.iter().copied().filter(|r| r.class_id == c.id));
            StudentClassPerformance {
                class_id: c.id,
                class_name: c.name.clone(),
                average_score: class_summary.average_score,
                completed_quizzes: class_summary.attempts,
                total_quizzes: per_class.get(&c.id).copied().unwrap_or(0),
            }
        })
        .collect();

    StudentDetail {
        id: student.id,
        name: student.display_name(),
        email: student.email.clone(),
        enrolled_classes,
        quiz_attempts: recent(own, usize::MAX),
        stats: StudentDetailStats {
            total_attempts: summary.attempts,
            average_score: summary.average_score,
            best_score: per_attempt.iter().copied().max().unwrap_or(0),
            worst_score: per_attempt.iter().copied().min().unwrap_or(0),
        },
    }
}

/// Roster of a class with each member's scores in it. Emails only when
/// `show_email` (the owning teacher is asking).
pub fn class_students(
    class: &Class,
    students: &[User],
    records: &[AttemptRecord],
    show_email: bool,
) -> Vec<ClassStudent> {
    students
        .iter()
        .map(|s| {
            let own: Vec<&AttemptRecord> = records
                .iter()
                .filter(|r| r.user_id == s.id && r.class_id == class.id)
                .collect();
            let summary = summarize(own.iter().copied());
            ClassStudent {
                id: s.id,
                name: s.name.clone(),
                email: show_email.then(|| s.email.clone()),
                attempts: summary.attempts,
                average_score: summary.average_score,
                scores: newest_first(own).into_iter().map(score_line).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(
        attempt_id: i64,
        user_id: i64,
        name: &str,
        quiz_id: i64,
        score: i32,
        max_score: i32,
        days_ago: i64,
    ) -> AttemptRecord {
        AttemptRecord {
            attempt_id,
            user_id,
            student_name: Some(name.to_string()),
            student_email: format!("{}@school.edu", name.to_lowercase()),
            student_role: Role::Student,
            quiz_id,
            quiz_title: format!("Quiz {}", quiz_id),
            class_id: 1,
            class_name: "Algebra".to_string(),
            teacher_id: 100,
            score,
            max_score,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    fn class(id: i64, name: &str, students: &[i64]) -> Class {
        Class {
            id,
            name: name.to_string(),
            code: "ABCDEF".to_string(),
            teacher_id: 100,
            student_ids: students.to_vec(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_rounds_and_handles_zero_max() {
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn empty_records_are_a_zero_state() {
        let summary = summarize(std::iter::empty());
        assert_eq!(summary, ScoreSummary::default());
        assert!(leaderboard(&[], Timeframe::All, Utc::now()).is_empty());

        let dashboard = teacher_dashboard(&[class(1, "Algebra", &[])], 0, &[]);
        assert_eq!(dashboard.stats.average_score, 0);
        assert_eq!(dashboard.stats.total_students, 0);
        assert!(dashboard.recent_activity.is_empty());
        assert!(dashboard.top_performers.is_empty());

        let student = student_dashboard(5, &[], &[], &[]);
        assert_eq!(student.stats.average_score, 0);
        assert_eq!(student.stats.rank, 1);
        assert_eq!(student.stats.total_students_in_rank, 0);
    }

    #[test]
    fn leaderboard_ranks_by_average_before_volume() {
        // S1: 80% over two quizzes, S2: 90% over one.
        let records = vec![
            rec(1, 1, "S1", 10, 4, 5, 1),
            rec(2, 1, "S1", 11, 8, 10, 1),
            rec(3, 2, "S2", 10, 9, 10, 1),
        ];
        let board = leaderboard(&records, Timeframe::All, Utc::now());
        let order: Vec<&str> = board.iter().map(|e| e.student_name.as_str()).collect();
        assert_eq!(order, ["S2", "S1"]);
        assert_eq!(board[0].average_score, 90);
        assert_eq!(board[1].average_score, 80);
        assert_eq!(board[1].quizzes_taken, 2);
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn ties_break_on_total_then_name() {
        let records = vec![
            rec(1, 1, "Zed", 10, 1, 2, 0),
            rec(2, 2, "Amy", 10, 1, 2, 0),
            rec(3, 3, "Bob", 10, 2, 4, 0),
        ];
        let order: Vec<i64> = standings(&records).iter().map(|s| s.user_id).collect();
        // All at 50%; Bob has the larger total, then Amy before Zed.
        assert_eq!(order, [3, 2, 1]);
    }

    #[test]
    fn timeframes_filter_by_attempt_date() {
        let records = vec![
            rec(1, 1, "Old", 10, 1, 1, 40),
            rec(2, 2, "Mid", 10, 1, 1, 10),
            rec(3, 3, "New", 10, 1, 1, 1),
        ];
        let now = Utc::now();
        assert_eq!(leaderboard(&records, Timeframe::All, now).len(), 3);
        assert_eq!(leaderboard(&records, Timeframe::Month, now).len(), 2);
        let week = leaderboard(&records, Timeframe::Week, now);
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].student_name, "New");
    }

    #[test]
    fn timeframe_parses_known_names_only() {
        assert_eq!("week".parse::<Timeframe>(), Ok(Timeframe::Week));
        assert_eq!("all".parse::<Timeframe>(), Ok(Timeframe::All));
        assert!("year".parse::<Timeframe>().is_err());
    }

    #[test]
    fn leaderboard_keeps_five_most_recent_scores() {
        let records: Vec<AttemptRecord> = (0..7)
            .map(|i| rec(i, 1, "S1", 10 + i, 1, 1, i))
            .collect();
        let board = leaderboard(&records, Timeframe::All, Utc::now());
        let quizzes: Vec<i64> = board[0].recent_scores.iter().map(|s| s.quiz_id).collect();
        assert_eq!(quizzes, [10, 11, 12, 13, 14]);
    }

    #[test]
    fn student_rank_counts_strictly_higher_averages() {
        let records = vec![
            rec(1, 1, "A", 10, 9, 10, 0),
            rec(2, 2, "B", 10, 7, 10, 0),
            rec(3, 3, "C", 10, 7, 10, 0),
            rec(4, 4, "D", 10, 5, 10, 0),
        ];
        assert_eq!(student_dashboard(1, &[], &[], &records).stats.rank, 1);
        assert_eq!(student_dashboard(2, &[], &[], &records).stats.rank, 2);
        assert_eq!(student_dashboard(3, &[], &[], &records).stats.rank, 2);
        let last = student_dashboard(4, &[], &[], &records);
        assert_eq!(last.stats.rank, 4);
        assert_eq!(last.stats.total_students_in_rank, 4);
    }

    #[test]
    fn former_students_are_not_ranked() {
        let mut promoted = rec(1, 1, "A", 10, 10, 10, 0);
        promoted.student_role = Role::Teacher;
        let records = vec![promoted, rec(2, 2, "B", 10, 5, 10, 0)];

        let board = leaderboard(&records, Timeframe::All, Utc::now());
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, 2);
        assert_eq!(board[0].rank, 1);

        let b = student_dashboard(2, &[], &[], &records);
        assert_eq!(b.stats.rank, 1);
        assert_eq!(b.stats.total_students_in_rank, 1);
    }

    #[test]
    fn top_performer_names_shared_class() {
        let classes = vec![class(1, "Algebra", &[1, 2]), class(2, "Geometry", &[2])];
        let records = vec![rec(1, 1, "S1", 10, 1, 1, 0), rec(2, 2, "S2", 10, 0, 1, 0)];
        let top = top_performers(&classes, &records);
        assert_eq!(top[0].class_name, "Algebra");
        assert_eq!(top[1].class_name, "Multiple Classes");
    }

    #[test]
    fn student_detail_reports_best_and_worst() {
        let student = User {
            id: 1,
            name: None,
            email: "s1@school.edu".to_string(),
            password: String::new(),
            role: crate::models::user::Role::Student,
            created_at: Utc::now(),
        };
        let records = vec![rec(1, 1, "S1", 10, 1, 4, 0), rec(2, 1, "S1", 11, 3, 4, 0)];
        let detail = student_detail(&student, &[class(1, "Algebra", &[1])], &[], &records);
        assert_eq!(detail.name, "s1@school.edu");
        assert_eq!(detail.stats.best_score, 75);
        assert_eq!(detail.stats.worst_score, 25);
        assert_eq!(detail.stats.average_score, 50);
        assert_eq!(detail.enrolled_classes[0].completed_quizzes, 2);
    }
}
