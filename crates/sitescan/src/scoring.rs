//! Performance score and letter grade.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Penalty applied for slow responses, shared by both scores.
fn response_time_penalty(response_time_ms: u64) -> i32 {
    match response_time_ms {
        t if t > 3000 => 40,
        t if t > 1000 => 25,
        t if t > 500 => 10,
        t if t > 200 => 5,
        _ => 0,
    }
}

/// Composite 0..=100 performance score.
///
/// A missing measurement costs 50 points; a fifth of the security score is
/// added back before clamping.
pub fn performance_score(
    response_time_ms: Option<u64>,
    is_secure: bool,
    compressed: bool,
    security_score: u8,
) -> u8 {
    let mut score = 100.0;

    score -= match response_time_ms {
        Some(ms) => f64::from(response_time_penalty(ms)),
        None => 50.0,
    };
    if !is_secure {
        score -= 20.0;
    }
    if !compressed {
        score -= 10.0;
    }
    score += f64::from(security_score) * 0.2;

    score.round().clamp(0.0, 100.0) as u8
}

/// Letter grade for the page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Grade a load; no measurement at all is an F.
    pub fn from_load(response_time_ms: Option<u64>, is_secure: bool, compressed: bool) -> Self {
        let Some(ms) = response_time_ms else {
            return Grade::F;
        };

        let mut score = 100 - response_time_penalty(ms);
        if !is_secure {
            score -= 15;
        }
        if !compressed {
            score -= 10;
        }

        Self::from_score(score)
    }

    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 90 => Grade::APlus,
            s if s >= 80 => Grade::A,
            s if s >= 70 => Grade::B,
            s if s >= 60 => Grade::C,
            s if s >= 50 => Grade::D,
            _ => Grade::F,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(label)
    }
}
