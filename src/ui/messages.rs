//! Plain-text message bodies. Kept together so the wording lives in one place.

use crate::db::models::{Job, Raid, Riddle};
use crate::jail;
use crate::utils::{mention_user, ts_long, ts_relative};

pub fn imprisonment(user_id: i64, riddle_text: &str) -> String {
    format!(
        "{} has been imprisoned! To get released, answer the following riddle \
         with `/solve answer:<your answer>`:\n\n>>> {}",
        mention_user(user_id),
        riddle_text,
    )
}

pub fn riddle_reminder(riddle: &Riddle) -> String {
    if riddle.is_sudoku {
        let grid = jail::parse_grid(&riddle.text)
            .map(|g| jail::display_grid(&g))
            .unwrap_or_else(|| riddle.text.clone());
        format!(
            "You already traded your riddle for a sudoku. Solve it with \
             `/solve answer:<81 digits, row by row>`:\n```\n{grid}\n```"
        )
    } else {
        format!("Your riddle is still waiting:\n\n>>> {}", riddle.text)
    }
}

pub fn right_answer(user_id: i64) -> String {
    format!(
        "That's the right answer! {} will be released shortly.",
        mention_user(user_id)
    )
}

pub fn wrong_answer(riddle: &Riddle) -> String {
    if riddle.is_sudoku {
        "That's not a valid solution. Check your digits and try again.".to_string()
    } else {
        "That's not it. Try again, or ask for a sudoku instead with `/sudoku`.".to_string()
    }
}

pub fn switch_sudoku(user_id: i64, grid: &str, difficulty: &str) -> String {
    let shown = jail::parse_grid(grid)
        .map(|g| jail::display_grid(&g))
        .unwrap_or_else(|| grid.to_string());
    format!(
        "{} traded their riddle for a {} sudoku. Answer with \
         `/solve answer:<81 digits, row by row>`, `0` or any digit of your \
         choice for the cells you fill in:\n```\n{}\n```",
        mention_user(user_id),
        difficulty.to_lowercase(),
        shown,
    )
}

pub fn release(user_id: i64) -> String {
    format!("{} has served their sentence and is free!", mention_user(user_id))
}

pub fn raid_reminder(raid: &Raid, ping_role: i64) -> String {
    format!(
        "<@&{}> **{}** is starting in 1 hour! ({})",
        ping_role,
        raid.title,
        ts_relative(raid.happens_on),
    )
}

pub fn raid_now(raid: &Raid, ping_role: i64) -> String {
    format!("<@&{}> **{}** is starting now!", ping_role, raid.title)
}

pub fn jobs_list(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "Nothing is scheduled for this server.".to_string();
    }
    let mut out = String::from("Scheduled jobs:\n");
    for job in jobs {
        out.push_str(&format!("- `{}` at {}\n", job.id, ts_long(job.fire_at)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn jobs_list_is_readable() {
        assert_eq!(jobs_list(&[]), "Nothing is scheduled for this server.");
        let job = Job {
            id: 7,
            guild_id: 1,
            fire_at: Utc::now(),
            args: "{}".into(),
            done: false,
            created_at: Utc::now(),
        };
        let listed = jobs_list(&[job]);
        assert!(listed.contains("`7`"));
    }

    #[test]
    fn sudoku_reminder_renders_grid() {
        let riddle = Riddle {
            guild_id: 1,
            user_id: 2,
            text: "0".repeat(81),
            solution: "1".repeat(81),
            is_sudoku: true,
            updated_at: Utc::now(),
        };
        let text = riddle_reminder(&riddle);
        assert!(text.contains(". . . | . . . | . . ."));
    }
}
