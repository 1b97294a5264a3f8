use serenity::all::{ButtonStyle, CreateActionRow, CreateButton};

use crate::db::models::RaidKind;
use crate::roster::Category;
use crate::utils::{signup_custom_id, ComponentAction};

/// The interactive row under a raid announcement. One toggle button per
/// joinable category plus the organiser's close control. `disabled` renders
/// the same row greyed out once sign-ups have ended.
pub fn signup_row(raid_id: i64, kind: RaidKind, disabled: bool) -> CreateActionRow {
    let leader_label = match kind {
        RaidKind::Starverse => "Join as leader",
        RaidKind::Kunlun => "Join as driver",
    };

    let mut buttons = vec![
        CreateButton::new(signup_custom_id(
            ComponentAction::Toggle(Category::Leader),
            raid_id,
        ))
        .label(leader_label)
        .style(ButtonStyle::Primary)
        .disabled(disabled),
        CreateButton::new(signup_custom_id(
            ComponentAction::Toggle(Category::Support),
            raid_id,
        ))
        .label("Join as support")
        .style(ButtonStyle::Secondary)
        .disabled(disabled),
    ];
    // Kunlun keeps an open backup bench; its own toggle also lets users who
    // were redirected there leave again.
    if kind.overflow_to_backup() {
        buttons.push(
            CreateButton::new(signup_custom_id(
                ComponentAction::Toggle(Category::Backup),
                raid_id,
            ))
            .label("Join backups")
            .style(ButtonStyle::Secondary)
            .disabled(disabled),
        );
    }
    buttons.push(
        CreateButton::new(signup_custom_id(ComponentAction::CloseSignups, raid_id))
            .label("Close sign-ups")
            .style(ButtonStyle::Danger)
            .disabled(disabled),
    );

    CreateActionRow::Buttons(buttons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn button_count(row: &CreateActionRow) -> usize {
        match row {
            CreateActionRow::Buttons(buttons) => buttons.len(),
            _ => 0,
        }
    }

    #[test]
    fn kunlun_rows_carry_a_backup_toggle() {
        assert_eq!(button_count(&signup_row(1, RaidKind::Starverse, false)), 3);
        assert_eq!(button_count(&signup_row(1, RaidKind::Kunlun, false)), 4);
    }
}
