// ABOUTME: Decides whether an inbound message is addressed to the bot.
// ABOUTME: Extracts the command line from "/name", "@name", "!name" or "name" prefixes.

/// Outcome of looking at a message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The message is a command line for the shell
    Command(String),
    /// Regular conversation
    Message,
}

impl Trigger {
    pub fn is_command(&self) -> bool {
        matches!(self, Trigger::Command(_))
    }

    pub fn as_command(&self) -> Option<&str> {
        match self {
            Trigger::Command(line) => Some(line),
            Trigger::Message => None,
        }
    }
}

const NAME_PREFIXES: [&str; 4] = ["/", "@", "!", ""];

/// Strip a leading bot name token, returning the rest of the line.
///
/// The name matches case-insensitively and must be followed by whitespace
/// or the end of the text, so "Shellyfish" does not address "Shelly".
pub fn strip_name<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    if name.is_empty() {
        return None;
    }

    NAME_PREFIXES.iter().find_map(|prefix| {
        let candidate = format!("{prefix}{name}").to_lowercase();
        let head = text.get(..candidate.len())?;
        if head.to_lowercase() != candidate {
            return None;
        }
        let rest = &text[candidate.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    })
}

/// Classify a message text.
///
/// * a leading name token makes the remainder a command line
/// * a mention of the bot, or a direct room, makes the whole text one
pub fn parse_trigger(text: &str, name: &str, mentioned: bool, direct: bool) -> Trigger {
    let trimmed = text.trim();

    if let Some(line) = strip_name(trimmed, name) {
        return Trigger::Command(line.to_string());
    }

    if mentioned || direct {
        return Trigger::Command(trimmed.to_string());
    }

    Trigger::Message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_prefixes() {
        for text in ["/shelly version", "@Shelly version", "!SHELLY version", "shelly version"] {
            assert_eq!(
                parse_trigger(text, "Shelly", false, false),
                Trigger::Command("version".to_string()),
                "text: {text}"
            );
        }
    }

    #[test]
    fn test_bare_name_is_empty_command() {
        assert_eq!(
            parse_trigger("  Shelly  ", "Shelly", false, false),
            Trigger::Command(String::new())
        );
    }

    #[test]
    fn test_name_must_be_a_whole_token() {
        assert_eq!(
            parse_trigger("shellyfish are tasty", "Shelly", false, false),
            Trigger::Message
        );
        assert_eq!(parse_trigger("hello shelly", "Shelly", false, false), Trigger::Message);
    }

    #[test]
    fn test_mention_and_direct_rooms() {
        assert_eq!(
            parse_trigger("help me", "Shelly", true, false),
            Trigger::Command("help me".to_string())
        );
        assert_eq!(
            parse_trigger("help me", "Shelly", false, true),
            Trigger::Command("help me".to_string())
        );
        assert_eq!(
            parse_trigger("@Shelly help", "Shelly", true, false).as_command(),
            Some("help")
        );
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        assert_eq!(parse_trigger("ééé", "Shelly", false, false), Trigger::Message);
        assert!(!parse_trigger("ééé", "Shelly", false, false).is_command());
    }
}
