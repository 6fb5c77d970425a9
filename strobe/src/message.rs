use std::time::Duration;

use strum::EnumString;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
pub enum TempoStep {
    #[strum(serialize = ">")]
    Faster,
    #[strum(serialize = "<")]
    Slower,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Toggle(usize),
    Tempo(TempoStep),
    Quit,
    Invalid(i64),
}

impl Command {
    pub fn parse(token: &str) -> Option<Command> {
        if let Ok(n) = token.parse::<i64>() {
            return Some(match n {
                -1 => Command::Quit,
                n if n >= 0 => usize::try_from(n)
                    .map(Command::Toggle)
                    .unwrap_or(Command::Invalid(n)),
                n => Command::Invalid(n),
            });
        }
        token.parse::<TempoStep>().ok().map(Command::Tempo)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoUpdate {
    pub at: Duration,
    pub period: Duration,
    pub interval: Duration,
}
