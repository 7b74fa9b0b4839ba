//! Line-oriented commands of the terminal front end.

use tilawa_bridge::config::Language;

pub const HELP: &str = "\
commands:
  reciters [filter]         list reciters, optionally filtered by name
  surahs                    list surahs
  select <reciter> [moshaf] pick a reciter and one of its moshafs
  play <surah>              play a surah of the selected moshaf
  resume | pause            continue or pause playback
  seek <secs|mm:ss>         jump to a position
  volume <0-100>            set the volume
  mute | unmute             toggle muting without touching the volume
  next                      play the next available surah
  status                    show the playback state
  lang <ar|eng>             switch the catalog language
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Reciters(Option<String>),
    Surahs,
    Select { reciter: u32, moshaf: Option<u32> },
    Play(u32),
    Resume,
    Pause,
    Seek(f64),
    /// Volume level in percent.
    Volume(u8),
    Mute,
    Unmute,
    Next,
    Status,
    Lang(Language),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command `{0}`, type `help` for the list")]
    Unknown(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {what}: `{value}`")]
    Invalid { what: &'static str, value: String },
}

fn number<T: std::str::FromStr>(
    value: Option<&str>,
    what: &'static str,
) -> Result<T, ParseError> {
    let value = value.ok_or(ParseError::Missing(what))?;
    value.parse().map_err(|_| ParseError::Invalid {
        what,
        value: value.to_string(),
    })
}

/// Parses `90`, `1:30` or `1:02:03` into seconds.
fn position(value: Option<&str>) -> Result<f64, ParseError> {
    let value = value.ok_or(ParseError::Missing("position"))?;
    let invalid = || ParseError::Invalid {
        what: "position",
        value: value.to_string(),
    };

    let mut seconds = 0.0;
    for part in value.split(':') {
        let part: f64 = part.parse().map_err(|_| invalid())?;
        seconds = seconds * 60.0 + part;
    }
    Ok(seconds)
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<CliCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "reciters" => {
            let filter = words.collect::<Vec<_>>().join(" ");
            CliCommand::Reciters((!filter.is_empty()).then_some(filter))
        }
        "surahs" => CliCommand::Surahs,
        "select" => CliCommand::Select {
            reciter: number(words.next(), "reciter id")?,
            moshaf: words
                .next()
                .map(|moshaf| number(Some(moshaf), "moshaf id"))
                .transpose()?,
        },
        "play" => CliCommand::Play(number(words.next(), "surah number")?),
        "resume" => CliCommand::Resume,
        "pause" => CliCommand::Pause,
        "seek" => CliCommand::Seek(position(words.next())?),
        "volume" => {
            let level: u8 = number(words.next(), "volume")?;
            if level > 100 {
                return Err(ParseError::Invalid {
                    what: "volume",
                    value: level.to_string(),
                });
            }
            CliCommand::Volume(level)
        }
        "mute" => CliCommand::Mute,
        "unmute" => CliCommand::Unmute,
        "next" => CliCommand::Next,
        "status" => CliCommand::Status,
        "lang" => {
            let code = words.next().ok_or(ParseError::Missing("language"))?;
            CliCommand::Lang(Language::from_code(code).ok_or_else(|| ParseError::Invalid {
                what: "language",
                value: code.to_string(),
            })?)
        }
        "help" | "?" => CliCommand::Help,
        "quit" | "exit" => CliCommand::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn reads_arguments() {
        assert_eq!(
            parse("reciters abdul basit"),
            Ok(Some(CliCommand::Reciters(Some("abdul basit".to_string()))))
        );
        assert_eq!(parse("reciters"), Ok(Some(CliCommand::Reciters(None))));
        assert_eq!(
            parse("select 123 7"),
            Ok(Some(CliCommand::Select {
                reciter: 123,
                moshaf: Some(7)
            }))
        );
        assert_eq!(
            parse("SELECT 123"),
            Ok(Some(CliCommand::Select {
                reciter: 123,
                moshaf: None
            }))
        );
        assert_eq!(parse("play 18"), Ok(Some(CliCommand::Play(18))));
        assert_eq!(parse("volume 40"), Ok(Some(CliCommand::Volume(40))));
        assert_eq!(
            parse("lang ar"),
            Ok(Some(CliCommand::Lang(Language::Arabic)))
        );
    }

    #[test]
    fn seek_accepts_clock_notation() {
        assert_eq!(parse("seek 12.5"), Ok(Some(CliCommand::Seek(12.5))));
        assert_eq!(parse("seek 1:30"), Ok(Some(CliCommand::Seek(90.0))));
        assert_eq!(parse("seek 1:02:03"), Ok(Some(CliCommand::Seek(3723.0))));
        assert!(parse("seek 1:xx").is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("play"), Err(ParseError::Missing("surah number")));
        assert_eq!(
            parse("volume 140"),
            Err(ParseError::Invalid {
                what: "volume",
                value: "140".to_string()
            })
        );
        assert!(parse("volume -3").is_err());
        assert!(parse("lang fr").is_err());
        assert_eq!(
            parse("shuffle"),
            Err(ParseError::Unknown("shuffle".to_string()))
        );
    }
}
