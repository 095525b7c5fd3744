//! Events command - list the built-in event catalogue.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use pl_core::error::PlResult;
use pl_socket::EventName;

use crate::OutputFormat;

/// Run the events command.
pub async fn run(format: OutputFormat) -> PlResult<()> {
    let catalogue = EventName::catalogue();

    match format {
        OutputFormat::Json => {
            let names: Vec<&str> = catalogue.iter().map(EventName::as_str).collect();
            super::print_json(&serde_json::json!(names));
        }
        OutputFormat::Text => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["#", "Event", "Group"]);

            for (i, name) in catalogue.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    name.to_string(),
                    group_of(name).to_string(),
                ]);
            }

            println!("{table}");
            println!("{} events declared at startup", catalogue.len());
        }
    }

    Ok(())
}

/// Coarse grouping shown next to each name.
fn group_of(name: &EventName) -> &'static str {
    if name.is_poll_event() {
        "poll"
    } else if name.is_moderation_event() {
        "moderation"
    } else {
        match name.as_str().split_once('.') {
            Some(("channel", _)) => "channel",
            Some(("subscription", _)) => "subscription",
            Some(("chat", _)) | Some(("chatroom", _)) => "chat",
            Some(("livestream", _)) => "livestream",
            Some(("host", _)) => "host",
            Some(("user", _)) => "user",
            _ => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_of() {
        assert_eq!(group_of(&EventName::PollVote), "poll");
        assert_eq!(group_of(&EventName::UserBan), "moderation");
        assert_eq!(group_of(&EventName::UserUpdate), "user");
        assert_eq!(group_of(&EventName::ChatroomJoin), "chat");
        assert_eq!(group_of(&EventName::Raid), "other");
        assert_eq!(group_of(&EventName::Other("kicks.gifted".into())), "other");
    }
}
