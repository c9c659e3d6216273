//! Text form of a template.
//!
//! ```text
//! system: You are a helpful assistant.
//! user: What is the tallest mountain?
//! assistant: Mount Everest.
//! ```
//!
//! A role line is a line whose text before the first `:` names a known role
//! (case-insensitive). Any other line continues the current message on a new
//! line, or opens a `user` message when nothing is open yet, so a free-form
//! prompt becomes a single user message. Blank lines only separate blocks.
//!
//! Content is kept verbatim: only the single space after a role's `:` is
//! dropped, so indentation and surrounding spaces survive a round trip.

use crate::message::{Message, Role};

/// Parse template text into messages.
pub fn parse_messages(text: &str) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut current: Option<Message> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some((role, content)) = split_role_line(line) {
            messages.extend(current.take());
            current = Some(Message::new(role, content));
            continue;
        }

        match current.as_mut() {
            Some(message) => {
                if !message.content.is_empty() {
                    message.content.push('\n');
                }
                message.content.push_str(line);
            }
            None => current = Some(Message::user(line)),
        }
    }

    messages.extend(current);
    messages
}

/// Render messages into template text.
///
/// Multi-line messages are followed by a blank line. Participant names have
/// no text form and are dropped.
pub fn render_messages(messages: &[Message]) -> String {
    let mut out = String::new();

    for (index, message) in messages.iter().enumerate() {
        if index > 0 {
            out.push('\n');
            if messages[index - 1].content.contains('\n') {
                out.push('\n');
            }
        }
        out.push_str(message.role.as_str());
        out.push(':');
        if !message.content.is_empty() {
            out.push(' ');
            out.push_str(&message.content);
        }
    }

    out
}

fn split_role_line(line: &str) -> Option<(Role, &str)> {
    let (head, rest) = line.split_once(':')?;
    let role = head.trim().parse::<Role>().ok()?;
    Some((role, rest.strip_prefix(' ').unwrap_or(rest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_text() {
        let text = "system: a system message\nuser: user message 1\nassistant: example response 1";
        assert_eq!(
            parse_messages(text),
            vec![
                Message::system("a system message"),
                Message::user("user message 1"),
                Message::assistant("example response 1"),
            ]
        );
    }

    #[test]
    fn free_form_text_is_one_user_message() {
        let text = "You are a pirate.\n\nSpeak like one.\n";
        assert_eq!(
            parse_messages(text),
            vec![Message::user("You are a pirate.\nSpeak like one.")]
        );
    }

    #[test]
    fn role_names_are_case_insensitive_and_may_be_indented() {
        let text = "  SYSTEM : be brief\nAssistant:ok";
        assert_eq!(
            parse_messages(text),
            vec![Message::system("be brief"), Message::assistant("ok")]
        );
    }

    #[test]
    fn unknown_prefix_continues_the_current_message() {
        let text = "system: rules follow\nNote: be polite\nuser: hi";
        assert_eq!(
            parse_messages(text),
            vec![
                Message::system("rules follow\nNote: be polite"),
                Message::user("hi"),
            ]
        );
    }

    #[test]
    fn empty_role_line_yields_empty_message() {
        let text = "system:\nuser: hi";
        assert_eq!(
            parse_messages(text),
            vec![Message::system(""), Message::user("hi")]
        );
        // continuation after an empty role line does not start with a newline
        assert_eq!(
            parse_messages("system:\nfirst line"),
            vec![Message::system("first line")]
        );
    }

    #[test]
    fn empty_text_has_no_messages() {
        assert!(parse_messages("").is_empty());
        assert!(parse_messages("\n \n").is_empty());
    }

    #[test]
    fn render_separates_multiline_blocks() {
        let messages = vec![
            Message::system("line one\nline two"),
            Message::user("hi"),
            Message::assistant(""),
        ];
        assert_eq!(
            render_messages(&messages),
            "system: line one\nline two\n\nuser: hi\nassistant:"
        );
    }

    #[test]
    fn structured_round_trip() {
        let messages = vec![
            Message::system("You answer in haiku.\nNever break form."),
            Message::user("Describe the sea"),
            Message::assistant("Waves fold into foam\nsalt wind carries gull voices\nthe tide keeps its time"),
            Message::user("Thanks: that was lovely"),
        ];
        assert_eq!(parse_messages(&render_messages(&messages)), messages);
    }

    #[test]
    fn round_trip_keeps_indentation_and_spacing() {
        let messages = vec![
            Message::user("Show me a loop"),
            Message::assistant(
                "fn main() {\n    for i in 0..3 {\n        println!(\"{i}\");\n    }\n}",
            ),
            Message::user("  padded  "),
            Message::system("\tindented rule"),
        ];
        let text = render_messages(&messages);
        assert!(text.contains("\n        println!"));
        assert_eq!(parse_messages(&text), messages);
    }

    #[test]
    fn free_form_lines_keep_their_indentation() {
        assert_eq!(
            parse_messages("Rules:\n  - be kind\n  - be brief"),
            vec![Message::user("Rules:\n  - be kind\n  - be brief")]
        );
    }
}
