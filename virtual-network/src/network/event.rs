use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpdateLinkStatus {
    Up,
    Down,
}

impl FromStr for UpdateLinkStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(UpdateLinkStatus::Up),
            "down" => Ok(UpdateLinkStatus::Down),
            _ => Err(()),
        }
    }
}

impl Display for UpdateLinkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateLinkStatus::Up => write!(f, "up"),
            UpdateLinkStatus::Down => write!(f, "down"),
        }
    }
}
