use foundation::EntityId;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(EntityId),
    Deselect,
    Show,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err("empty command".to_string());
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "select" | "s" => {
                let raw = parts.next().ok_or("usage: select <id>")?;
                let id = EntityId::parse(raw).ok_or_else(|| format!("invalid id {raw:?}"))?;
                Command::Select(id)
            }
            "deselect" | "d" => Command::Deselect,
            "show" | "?" => Command::Show,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command {other:?}")),
        };

        if parts.next().is_some() {
            return Err(format!("too many arguments for {verb}"));
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::Command;
    use foundation::EntityId;

    #[test]
    fn parses_select_with_normalised_id() {
        assert_eq!(
            Command::parse("select  4CA7B5 ").unwrap(),
            Command::Select(EntityId::parse("4ca7b5").unwrap())
        );
        assert_eq!(
            Command::parse("s abc123").unwrap(),
            Command::Select(EntityId::parse("abc123").unwrap())
        );
    }

    #[test]
    fn parses_bare_verbs() {
        assert_eq!(Command::parse("deselect").unwrap(), Command::Deselect);
        assert_eq!(Command::parse("SHOW").unwrap(), Command::Show);
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("select").is_err());
        assert!(Command::parse("deselect now").is_err());
        assert!(Command::parse("fly abc").is_err());
    }
}
