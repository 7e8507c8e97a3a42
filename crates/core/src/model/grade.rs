use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradeScaleError {
    #[error("grade scale needs at least one band")]
    NoBands,

    #[error("grade threshold {0} exceeds 100")]
    ThresholdTooHigh(u8),

    #[error("grade thresholds must strictly descend")]
    NonDescending,
}

//
// ─── GRADE SCALE ───────────────────────────────────────────────────────────────
//

/// One rung of a grade scale: `letter` applies at or above `min_percent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeBand {
    pub min_percent: u8,
    pub letter: char,
}

/// Maps a completion percentage to a letter grade.
///
/// Bands are ordered from the highest threshold down; anything below the
/// last band earns the fallback letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
    fallback: char,
}

impl GradeScale {
    /// Creates a custom scale.
    ///
    /// # Errors
    ///
    /// Returns an error if no bands are given, a threshold exceeds 100, or
    /// thresholds do not strictly descend.
    pub fn new(bands: Vec<GradeBand>, fallback: char) -> Result<Self, GradeScaleError> {
        if bands.is_empty() {
            return Err(GradeScaleError::NoBands);
        }
        for band in &bands {
            if band.min_percent > 100 {
                return Err(GradeScaleError::ThresholdTooHigh(band.min_percent));
            }
        }
        if bands.windows(2).any(|w| w[0].min_percent <= w[1].min_percent) {
            return Err(GradeScaleError::NonDescending);
        }

        Ok(Self { bands, fallback })
    }

    /// Letter earned at the given completion percentage.
    #[must_use]
    pub fn letter_for(&self, percent: u8) -> char {
        self.bands
            .iter()
            .find(|band| percent >= band.min_percent)
            .map_or(self.fallback, |band| band.letter)
    }
}

impl Default for GradeScale {
    /// The familiar A/B/C/D/F table: A at 90, B at 80, C at 70, D at 60.
    fn default() -> Self {
        Self {
            bands: vec![
                GradeBand {
                    min_percent: 90,
                    letter: 'A',
                },
                GradeBand {
                    min_percent: 80,
                    letter: 'B',
                },
                GradeBand {
                    min_percent: 70,
                    letter: 'C',
                },
                GradeBand {
                    min_percent: 60,
                    letter: 'D',
                },
            ],
            fallback: 'F',
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_letters() {
        let scale = GradeScale::default();
        assert_eq!(scale.letter_for(100), 'A');
        assert_eq!(scale.letter_for(90), 'A');
        assert_eq!(scale.letter_for(89), 'B');
        assert_eq!(scale.letter_for(70), 'C');
        assert_eq!(scale.letter_for(65), 'D');
        assert_eq!(scale.letter_for(59), 'F');
        assert_eq!(scale.letter_for(0), 'F');
    }

    #[test]
    fn new_rejects_empty_scale() {
        let err = GradeScale::new(vec![], 'F').unwrap_err();
        assert_eq!(err, GradeScaleError::NoBands);
    }

    #[test]
    fn new_rejects_threshold_above_100() {
        let err = GradeScale::new(
            vec![GradeBand {
                min_percent: 101,
                letter: 'A',
            }],
            'F',
        )
        .unwrap_err();
        assert_eq!(err, GradeScaleError::ThresholdTooHigh(101));
    }

    #[test]
    fn new_rejects_non_descending_bands() {
        let err = GradeScale::new(
            vec![
                GradeBand {
                    min_percent: 80,
                    letter: 'B',
                },
                GradeBand {
                    min_percent: 90,
                    letter: 'A',
                },
            ],
            'F',
        )
        .unwrap_err();
        assert_eq!(err, GradeScaleError::NonDescending);
    }

    #[test]
    fn custom_pass_fail_scale() {
        let scale = GradeScale::new(
            vec![GradeBand {
                min_percent: 50,
                letter: 'P',
            }],
            'F',
        )
        .unwrap();

        assert_eq!(scale.letter_for(50), 'P');
        assert_eq!(scale.letter_for(49), 'F');
    }
}
