use serde::Serialize;

use super::ShapeError;
use crate::model::{Column, FeatureVector};

pub const DEFAULT_WIDTH: u32 = 700;
pub const DEFAULT_HEIGHT: u32 = 500;

/// One closed polygon: the first vertex is repeated at the end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarTrace {
    pub name: String,
    pub r: Vec<f64>,
    pub theta: Vec<&'static str>,
    pub fill: &'static str,
}

/// Two overlaid polygons on the comparable feature axes, radial axis fixed to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarSpec {
    pub axes: Vec<Column>,
    pub traces: Vec<RadarTrace>,
    pub radial_range: [f64; 2],
    pub show_legend: bool,
    pub width: u32,
    pub height: u32,
}

impl RadarSpec {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Legend name of a decade polygon.
pub fn decade_label(decade: i32) -> String {
    format!("Decade {decade} average")
}

/// Legend name of a track polygon.
pub fn track_label(name: &str, release_date: &str) -> String {
    format!("{name}, {release_date}")
}

/// Build the decade-vs-track radar. Both vectors are restricted to
/// `Column::COMPARABLE` (extra columns such as loudness are ignored), and each
/// must carry every comparable axis.
pub fn radar_spec(
    decade: &FeatureVector,
    track: &FeatureVector,
    decade_name: &str,
    track_name: &str,
) -> Result<RadarSpec, ShapeError> {
    let decade_r = restrict(decade, "decade")?;
    let track_r = restrict(track, "track")?;

    Ok(RadarSpec {
        axes: Column::COMPARABLE.to_vec(),
        traces: vec![trace(decade_name, decade_r), trace(track_name, track_r)],
        radial_range: [0.0, 1.0],
        show_legend: true,
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
    })
}

fn restrict(vector: &FeatureVector, which: &str) -> Result<Vec<f64>, ShapeError> {
    let mut values = Vec::with_capacity(Column::COMPARABLE.len());
    let mut missing = Vec::new();
    for column in Column::COMPARABLE {
        match vector.get(column) {
            Some(v) => values.push(v),
            None => missing.push(column),
        }
    }
    if missing.is_empty() {
        Ok(values)
    } else {
        Err(ShapeError::MissingAxis {
            vector: which.to_string(),
            missing,
        })
    }
}

fn trace(name: &str, mut r: Vec<f64>) -> RadarTrace {
    let mut theta: Vec<&'static str> = Column::COMPARABLE.iter().map(|c| c.name()).collect();
    if let (Some(&r0), Some(&t0)) = (r.first(), theta.first()) {
        r.push(r0);
        theta.push(t0);
    }
    RadarTrace {
        name: name.to_string(),
        r,
        theta,
        fill: "toself",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(value: f64) -> FeatureVector {
        FeatureVector::from_pairs(Column::COMPARABLE.iter().map(|&c| (c, value)))
    }

    #[test]
    fn test_radar_two_closed_traces() {
        let spec = radar_spec(&full(0.25), &full(0.75), &decade_label(1970), &track_label("Smoke on the Water", "1972-03-25")).unwrap();

        assert_eq!(spec.axes.len(), 7);
        assert_eq!(spec.traces.len(), 2);
        assert_eq!(spec.traces[0].name, "Decade 1970 average");
        assert_eq!(spec.traces[1].name, "Smoke on the Water, 1972-03-25");
        for t in &spec.traces {
            assert_eq!(t.r.len(), 8);
            assert_eq!(t.r.first(), t.r.last());
            assert_eq!(t.theta.first(), t.theta.last());
            assert_eq!(t.theta[0], "danceability");
        }
        assert_eq!(spec.radial_range, [0.0, 1.0]);
        assert_eq!((spec.width, spec.height), (700, 500));
    }

    #[test]
    fn test_extra_columns_are_ignored_and_order_normalized() {
        let mut pairs: Vec<(Column, f64)> = Column::COMPARABLE.iter().rev().map(|&c| (c, 0.5)).collect();
        pairs.push((Column::Loudness, -6.0));
        pairs.push((Column::Tempo, 120.0));
        let shuffled = FeatureVector::from_pairs(pairs);

        let spec = radar_spec(&full(0.1), &shuffled, "a", "b").unwrap();
        assert_eq!(spec.traces[1].r, vec![0.5; 8]);
    }

    #[test]
    fn test_missing_axis_is_shape_error() {
        let partial = FeatureVector::from_pairs(
            Column::COMPARABLE.iter().filter(|&&c| c != Column::Liveness).map(|&c| (c, 0.5)),
        );
        let err = radar_spec(&full(0.5), &partial, "a", "b").unwrap_err();
        assert_eq!(
            err,
            ShapeError::MissingAxis {
                vector: "track".into(),
                missing: vec![Column::Liveness],
            }
        );
    }

    #[test]
    fn test_with_size() {
        let spec = radar_spec(&full(0.5), &full(0.5), "a", "b").unwrap().with_size(900, 600);
        assert_eq!((spec.width, spec.height), (900, 600));
    }
}
