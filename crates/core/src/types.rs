/// Label ids are signed 32-bit to match the int32 label arrays produced by
/// segmentation pipelines. Valid ids are non-negative; 0 is background.
pub type LabelId = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A pixel position. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}
