//! Chart specifications for a rendering layer. Builders here are pure: they never
//! touch the filesystem or the network, and their output serializes to JSON.

pub mod radar;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::CorrelationMatrix;
use crate::model::{Column, NumericRow};

pub use radar::{radar_spec, RadarSpec, RadarTrace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("{vector} vector is missing axes: {}", column_list(missing))]
    MissingAxis { vector: String, missing: Vec<Column> },
    #[error("column '{0}' is not present in the correlation matrix")]
    UnknownColumn(Column),
}

fn column_list(columns: &[Column]) -> String {
    columns.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
}

/// Continuous color scales understood by the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorScale {
    #[default]
    Tealgrn,
    Viridis,
    Plasma,
    Blues,
    RdBu,
}

impl ColorScale {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tealgrn => "Tealgrn",
            Self::Viridis => "Viridis",
            Self::Plasma => "Plasma",
            Self::Blues => "Blues",
            Self::RdBu => "RdBu",
        }
    }
}

impl fmt::Display for ColorScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Tealgrn, Self::Viridis, Self::Plasma, Self::Blues, Self::RdBu]
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown color scale '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub column: Column,
    pub label: &'static str,
}

impl From<Column> for Axis {
    fn from(column: Column) -> Self {
        Self {
            column,
            label: column.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub color: f64,
    pub size: f64,
}

/// One point per input row; color and size both on continuous scales.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterSpec {
    pub x: Axis,
    pub y: Axis,
    pub color: Axis,
    pub size: Axis,
    pub color_scale: ColorScale,
    pub points: Vec<ScatterPoint>,
}

impl ScatterSpec {
    pub fn with_color_scale(mut self, color_scale: ColorScale) -> Self {
        self.color_scale = color_scale;
        self
    }
}

/// Rows lacking any of the four selected columns are left out.
pub fn scatter_spec<R: NumericRow>(rows: &[R], x: Column, y: Column, color: Column, size: Column) -> ScatterSpec {
    let points = rows
        .iter()
        .filter_map(|row| {
            Some(ScatterPoint {
                x: row.value(x)?,
                y: row.value(y)?,
                color: row.value(color)?,
                size: row.value(size)?,
            })
        })
        .collect();

    ScatterSpec {
        x: x.into(),
        y: y.into(),
        color: color.into(),
        size: size.into(),
        color_scale: ColorScale::default(),
        points,
    }
}

/// Square grid over a correlation matrix. Undefined (NaN) cells are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapSpec {
    pub x_labels: Vec<String>,
    pub y_labels: Vec<String>,
    pub z: Vec<Vec<Option<f64>>>,
    pub z_min: f64,
    pub z_max: f64,
    pub color_scale: ColorScale,
}

impl HeatmapSpec {
    pub fn with_color_scale(mut self, color_scale: ColorScale) -> Self {
        self.color_scale = color_scale;
        self
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.z.get(row)?.get(col).copied().flatten()
    }
}

/// Lay out `matrix` with both axes in `ordered` order. An empty matrix (from an
/// empty table) yields a grid of undefined cells.
pub fn correlation_heatmap_spec(matrix: &CorrelationMatrix, ordered: &[Column]) -> Result<HeatmapSpec, ShapeError> {
    let labels: Vec<String> = ordered.iter().map(|c| c.name().to_string()).collect();

    let z = if matrix.is_empty() {
        vec![vec![None; ordered.len()]; ordered.len()]
    } else {
        let indices: Vec<usize> = ordered
            .iter()
            .map(|&c| matrix.index_of(c).ok_or(ShapeError::UnknownColumn(c)))
            .collect::<Result<_, _>>()?;
        indices
            .iter()
            .map(|&i| {
                indices
                    .iter()
                    .map(|&j| Some(matrix.values()[i][j]).filter(|v| !v.is_nan()))
                    .collect()
            })
            .collect()
    };

    Ok(HeatmapSpec {
        x_labels: labels.clone(),
        y_labels: labels,
        z,
        z_min: -1.0,
        z_max: 1.0,
        color_scale: ColorScale::default(),
    })
}
