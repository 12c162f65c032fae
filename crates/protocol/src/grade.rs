//! Grade display details derived from an assignment's grading state.

use serde::{Deserialize, Serialize};

/// Label offset used whenever a details line is shown under the grade.
const DETAILS_LABEL_OFFSET: f64 = -21.0;

/// How an assignment is graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingType {
    PassFail,
    Percent,
    LetterGrade,
    GpaScale,
    Points,
    NotGraded,
    #[serde(other)]
    Unknown,
}

/// Grading fields of an assignment as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentGrade {
    pub grading_type: GradingType,
    #[serde(default)]
    pub points_possible: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<String>,
}

/// What the grade view should show.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeSummary {
    None,
    AwaitingGrade,
    Ungraded,
    LetterGradeOrGpa {
        grade: String,
        points: f64,
        possible: f64,
    },
    Points {
        points: f64,
        possible: f64,
    },
    Percent {
        text: String,
        points: f64,
        possible: f64,
    },
    CompleteOrIncomplete {
        label: String,
        points: f64,
        possible: f64,
    },
}

/// Display values for a [`GradeSummary`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradeDetails {
    pub grade: String,
    pub grade_details: String,
    pub circle_percent: f64,
    pub grade_label_offset: f64,
}

impl GradeSummary {
    pub fn for_assignment(assignment: &AssignmentGrade) -> Self {
        if assignment.graded_at.is_none() && assignment.grading_type != GradingType::NotGraded {
            return Self::AwaitingGrade;
        }

        let points = assignment.current_score.unwrap_or(0.0);
        let possible = assignment.points_possible;
        let grade = || assignment.current_grade.clone().unwrap_or_default();

        match assignment.grading_type {
            GradingType::NotGraded => Self::Ungraded,
            GradingType::LetterGrade | GradingType::GpaScale => Self::LetterGradeOrGpa {
                grade: grade(),
                points,
                possible,
            },
            GradingType::PassFail => Self::CompleteOrIncomplete {
                label: grade(),
                points,
                possible,
            },
            GradingType::Percent => Self::Percent {
                text: grade(),
                points,
                possible,
            },
            GradingType::Points => Self::Points { points, possible },
            GradingType::Unknown => Self::None,
        }
    }

    /// Computes display values, formatting numbers with `formatter`.
    pub fn details(&self, formatter: impl Fn(f64) -> String) -> GradeDetails {
        let mut details = GradeDetails {
            grade: String::new(),
            grade_details: String::new(),
            circle_percent: 0.0,
            grade_label_offset: DETAILS_LABEL_OFFSET,
        };
        let of = |points: f64, possible: f64| {
            format!("{} of {}", formatter(points), formatter(possible))
        };

        match self {
            Self::None => details.grade_label_offset = 0.0,
            Self::AwaitingGrade => {
                details.grade = formatter(0.0);
                details.grade_details = "Awaiting Grade".into();
            }
            Self::Ungraded => {
                details.grade = "Ungraded".into();
                details.grade_label_offset = 0.0;
            }
            Self::LetterGradeOrGpa {
                grade,
                points,
                possible,
            } => {
                details.grade = grade.clone();
                details.grade_details = of(*points, *possible);
                details.circle_percent = fraction(*points, *possible);
            }
            Self::Points { points, possible } => {
                details.grade = formatter(*points);
                details.grade_details = format!(" of {}", formatter(*possible));
                details.circle_percent = fraction(*points, *possible);
            }
            Self::Percent {
                text,
                points,
                possible,
            } => {
                details.grade = text.clone();
                details.grade_details = of(*points, *possible);
                details.circle_percent = fraction(*points, *possible);
            }
            Self::CompleteOrIncomplete {
                label,
                points,
                possible,
            } => {
                details.grade = capitalize_words(label);
                details.grade_details = of(*points, *possible);
                details.circle_percent = fraction(*points, *possible);
            }
        }
        details
    }
}

fn fraction(points: f64, possible: f64) -> f64 {
    if possible <= 0.0 { 0.0 } else { points / possible }
}

/// Uppercases the first letter of each word and lowercases the rest.
fn capitalize_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
