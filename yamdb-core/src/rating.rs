use thiserror::Error;

/// The average score of a title. `None` if it has no reviews.
pub type Rating = Option<f64>;

/// A review score, always within [Score::MIN] and [Score::MAX].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(i32);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Score must be between {} and {}, got {0}", Score::MIN, Score::MAX)]
pub struct ScoreOutOfRange(pub i32);

impl Score {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 10;

    pub fn new(value: i32) -> Result<Self, ScoreOutOfRange> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ScoreOutOfRange(value))
        }
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for Score {
    type Error = ScoreOutOfRange;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Computes the arithmetic mean of the given scores.
/// An empty set has no rating, which is different from a rating of zero.
pub fn mean_score<I>(scores: I) -> Rating
where
    I: IntoIterator<Item = Score>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0i64, 0u32), |(sum, count), s| (sum + s.value() as i64, count + 1));

    (count > 0).then(|| sum as f64 / count as f64)
}

#[cfg(test)]
mod test {
    use super::*;

    fn scores(values: &[i32]) -> Vec<Score> {
        values.iter().map(|v| Score::new(*v).unwrap()).collect()
    }

    #[test]
    fn test_score_bounds() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(11).is_err());
        assert_eq!(Score::new(1).unwrap().value(), 1);
        assert_eq!(Score::new(10).unwrap().value(), 10);
        assert_eq!(Score::try_from(-3), Err(ScoreOutOfRange(-3)));
    }

    #[test]
    fn test_mean_score() {
        assert_eq!(mean_score(Vec::new()), None, "no reviews means no rating");
        assert_eq!(mean_score(scores(&[8, 4])), Some(6.));
        assert_eq!(mean_score(scores(&[1, 2])), Some(1.5));
        assert_eq!(mean_score(scores(&[10])), Some(10.));
    }
}
