//! User directory normalization and the late-joiner rule.

use crate::types::{Contest, UserRecord};
use std::collections::HashSet;

/// Drop junk rows and duplicates from a raw directory listing.
///
/// Keeps usernames of at least 2 characters with an email containing `@`,
/// deduplicated by lowercase email. Rows without an email are dropped.
pub fn normalize_users(raw: Vec<UserRecord>) -> Vec<UserRecord> {
    let mut seen = HashSet::new();

    raw.into_iter()
        .map(|u| UserRecord {
            username: u.username.trim().to_string(),
            email: u.email.trim().to_string(),
            ..u
        })
        .filter(|u| u.username.chars().count() >= 2 && u.email.contains('@'))
        .filter(|u| seen.insert(u.email.to_lowercase()))
        .collect()
}

/// Whether `username` joined after the contest started and is not eligible.
///
/// Fails open: without a known account creation time the user is allowed.
pub fn is_late_joiner(contest: &Contest, username: &str, user: Option<&UserRecord>) -> bool {
    let Some(started_at) = contest.started_at else {
        return false;
    };
    if contest.eligible_users.contains(username) {
        return false;
    }
    match user.and_then(|u| u.created_at) {
        Some(created_at) => created_at > started_at,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(username: &str, email: &str) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            is_admin: false,
            created_at: None,
        }
    }

    #[test]
    fn test_normalize_drops_junk() {
        let users = normalize_users(vec![
            user("a", "a@example.com"),
            user("sophia", "no-at-sign"),
            user("  maria ", " maria@example.com "),
        ]);

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "maria");
        assert_eq!(users[0].email, "maria@example.com");
    }

    #[test]
    fn test_normalize_dedupes_by_lowercase_email() {
        let users = normalize_users(vec![
            user("giorgos", "Giorgos@Example.com"),
            user("giorgos2", "giorgos@example.com"),
            user("petros", "petros@example.com"),
        ]);

        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["giorgos", "petros"]);
    }

    #[test]
    fn test_normalize_drops_rows_without_email() {
        let users = normalize_users(vec![
            user("eleni", ""),
            user("eleni", "   "),
            user("eleni", "eleni@example.com"),
        ]);

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "eleni@example.com");
    }

    #[test]
    fn test_late_joiner_rule() {
        let mut contest = Contest::new("ABCDE".to_string());
        let started = Utc::now();
        contest.started_at = Some(started);
        contest.eligible_users.insert("early".to_string());

        let mut late = user("late", "late@example.com");
        late.created_at = Some(started + Duration::hours(1));
        assert!(is_late_joiner(&contest, "late", Some(&late)));

        let mut old = user("old", "old@example.com");
        old.created_at = Some(started - Duration::days(3));
        assert!(!is_late_joiner(&contest, "old", Some(&old)));

        // Eligible users are never late, whatever their timestamp
        let mut early = user("early", "early@example.com");
        early.created_at = Some(started + Duration::hours(1));
        assert!(!is_late_joiner(&contest, "early", Some(&early)));
    }

    #[test]
    fn test_late_joiner_fails_open() {
        let mut contest = Contest::new("ABCDE".to_string());
        contest.started_at = Some(Utc::now());

        assert!(!is_late_joiner(&contest, "unknown", None));
        assert!(!is_late_joiner(
            &contest,
            "nostamp",
            Some(&user("nostamp", "n@example.com"))
        ));
    }

    #[test]
    fn test_nobody_is_late_before_start() {
        let contest = Contest::new("ABCDE".to_string());
        let mut u = user("new", "new@example.com");
        u.created_at = Some(Utc::now());
        assert!(!is_late_joiner(&contest, "new", Some(&u)));
    }
}
