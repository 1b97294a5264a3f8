use chrono::{DateTime, NaiveDateTime, Utc};
use serenity::all::{Mentionable, UserId};

use crate::roster::Category;

/// An action encoded in a component custom id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    Toggle(Category),
    CloseSignups,
}

/* custom_id formats: "r:ld:<raid_id>", "r:sp:<raid_id>", "r:cl:<raid_id>" */
pub fn signup_custom_id(action: ComponentAction, raid_id: i64) -> String {
    let tag = match action {
        ComponentAction::Toggle(Category::Leader) => "ld",
        ComponentAction::Toggle(Category::Backup) => "bk",
        ComponentAction::Toggle(Category::Support) => "sp",
        ComponentAction::CloseSignups => "cl",
    };
    format!("r:{tag}:{raid_id}")
}

pub fn parse_component_id(s: &str) -> Option<(ComponentAction, i64)> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        ["r", "ld", id] => id.parse().ok().map(|i| (ComponentAction::Toggle(Category::Leader), i)),
        ["r", "bk", id] => id.parse().ok().map(|i| (ComponentAction::Toggle(Category::Backup), i)),
        ["r", "sp", id] => id.parse().ok().map(|i| (ComponentAction::Toggle(Category::Support), i)),
        ["r", "cl", id] => id.parse().ok().map(|i| (ComponentAction::CloseSignups, i)),
        _ => None,
    }
}

/* Parse "YYYY-MM-DD HH:MM" as UTC */
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Discord timestamp markup rendered in each reader's locale.
pub fn ts_long(dt: DateTime<Utc>) -> String {
    format!("<t:{}:F>", dt.timestamp())
}

pub fn ts_relative(dt: DateTime<Utc>) -> String {
    format!("<t:{}:R>", dt.timestamp())
}

pub fn mention_user(id: i64) -> String {
    UserId::new(id as u64).mention().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_ids_round_trip() {
        for action in [
            ComponentAction::Toggle(Category::Leader),
            ComponentAction::Toggle(Category::Backup),
            ComponentAction::Toggle(Category::Support),
            ComponentAction::CloseSignups,
        ] {
            let id = signup_custom_id(action, 42);
            assert_eq!(parse_component_id(&id), Some((action, 42)));
        }
    }

    #[test]
    fn foreign_custom_ids_are_ignored() {
        assert_eq!(parse_component_id("something:else"), None);
        assert_eq!(parse_component_id("r:ld:not-a-number"), None);
        assert_eq!(parse_component_id(""), None);
    }

    #[test]
    fn datetime_parsing() {
        let dt = parse_datetime("2025-03-01 18:30").unwrap();
        assert_eq!(dt.timestamp(), 1740853800);
        assert!(parse_datetime("tomorrow").is_none());
        assert!(parse_datetime("2025-13-01 18:30").is_none());
    }
}
