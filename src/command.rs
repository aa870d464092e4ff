use strum_macros::{Display, EnumString};
use thiserror::Error;

/// The selectable front-end views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum View {
    Shelf,
    Book,
    Typespeed,
    Steno,
}

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `switch [view]`; no argument toggles shelf and book.
    Switch(Option<View>),
    /// `load <book_id>`.
    Load(usize),
    /// `chapter <n> [m]`; `m` moves the typing cursor along.
    Chapter { index: usize, move_cursor: bool },
    NextChapter,
    PreviousChapter,
    AdvanceLine,
    Hist,
    BookList,
    Customise,
    About(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Keyword {
    Switch,
    Load,
    Chapter,
    NextChapter,
    PreviousChapter,
    AdvanceLine,
    Hist,
    BookList,
    Customise,
    About,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{command}: expected {expected}")]
    BadArguments {
        command: &'static str,
        expected: &'static str,
    },
}

/// Decide whether a console line is a command or typing input. Lines
/// starting with `prefix` are commands; everything else passes through.
pub fn classify<'a>(line: &'a str, prefix: &str) -> ConsoleLine<'a> {
    match line.strip_prefix(prefix) {
        Some(rest) => ConsoleLine::Command(rest),
        None => ConsoleLine::Typing(line),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLine<'a> {
    Command(&'a str),
    Typing(&'a str),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut words = input.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseError::UnknownCommand(String::new()));
        };
        let keyword: Keyword = head
            .parse()
            .map_err(|_| ParseError::UnknownCommand(head.to_string()))?;
        let args: Vec<&str> = words.collect();

        match keyword {
            Keyword::Switch => match args.as_slice() {
                [] => Ok(Command::Switch(None)),
                [view] => view
                    .parse()
                    .map(|v| Command::Switch(Some(v)))
                    .map_err(|_| ParseError::BadArguments {
                        command: "switch",
                        expected: "shelf, book, typespeed or steno",
                    }),
                _ => Err(ParseError::BadArguments {
                    command: "switch",
                    expected: "at most one view name",
                }),
            },
            Keyword::Load => match args.as_slice() {
                [id] => id.parse().map(Command::Load).map_err(|_| {
                    ParseError::BadArguments {
                        command: "load",
                        expected: "a book id",
                    }
                }),
                _ => Err(ParseError::BadArguments {
                    command: "load",
                    expected: "a book id",
                }),
            },
            Keyword::Chapter => {
                let bad = ParseError::BadArguments {
                    command: "chapter",
                    expected: "a chapter number, optionally followed by `m`",
                };
                match args.as_slice() {
                    [n] => n
                        .parse()
                        .map(|index| Command::Chapter {
                            index,
                            move_cursor: false,
                        })
                        .map_err(|_| bad),
                    [n, m] if m.eq_ignore_ascii_case("m") => n
                        .parse()
                        .map(|index| Command::Chapter {
                            index,
                            move_cursor: true,
                        })
                        .map_err(|_| bad),
                    _ => Err(bad),
                }
            }
            Keyword::NextChapter => Ok(Command::NextChapter),
            Keyword::PreviousChapter => Ok(Command::PreviousChapter),
            Keyword::AdvanceLine => Ok(Command::AdvanceLine),
            Keyword::Hist => Ok(Command::Hist),
            Keyword::BookList => Ok(Command::BookList),
            Keyword::Customise => Ok(Command::Customise),
            Keyword::About => Ok(Command::About(args.first().map(|s| s.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_uses_configurable_prefix() {
        assert_eq!(classify(">load 3", ">"), ConsoleLine::Command("load 3"));
        assert_eq!(classify("hello", ">"), ConsoleLine::Typing("hello"));
        assert_eq!(classify(":hist", ":"), ConsoleLine::Command("hist"));
        // The old prefix is plain typing once the prefix changes.
        assert_eq!(classify(">hist", ":"), ConsoleLine::Typing(">hist"));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            Command::parse("NextChapter").unwrap(),
            Command::NextChapter
        );
        assert_eq!(
            Command::parse("SWITCH BOOK").unwrap(),
            Command::Switch(Some(View::Book))
        );
    }

    #[test]
    fn test_switch_without_argument_toggles() {
        assert_eq!(Command::parse("switch").unwrap(), Command::Switch(None));
    }

    #[test]
    fn test_chapter_move_flag() {
        assert_eq!(
            Command::parse("chapter 4").unwrap(),
            Command::Chapter {
                index: 4,
                move_cursor: false
            }
        );
        assert_eq!(
            Command::parse("chapter 4 m").unwrap(),
            Command::Chapter {
                index: 4,
                move_cursor: true
            }
        );
        assert!(Command::parse("chapter four").is_err());
    }

    #[test]
    fn test_load_requires_integer_id() {
        assert_eq!(Command::parse("load 12").unwrap(), Command::Load(12));
        assert!(Command::parse("load").is_err());
        assert!(Command::parse("load moby").is_err());
    }

    #[test]
    fn test_about_page_is_optional() {
        assert_eq!(Command::parse("about").unwrap(), Command::About(None));
        assert_eq!(
            Command::parse("about shortcuts").unwrap(),
            Command::About(Some("shortcuts".to_string()))
        );
    }

    #[test]
    fn test_unknown_command_errors() {
        assert_eq!(
            Command::parse("frobnicate"),
            Err(ParseError::UnknownCommand("frobnicate".to_string()))
        );
        assert!(Command::parse("").is_err());
    }
}
