//! Frame storage for raw and label stacks (PRD-02).
//!
//! [`Buffer2D`] is a flat row-major 2-D pixel buffer. [`FrameStore`] owns one
//! project's raw intensity stack and label stack and provides bounds-checked
//! access to individual slices. The store performs no interpretation of label
//! values; that is the edit engine's job.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::LabelId;

// ---------------------------------------------------------------------------
// Buffer2D
// ---------------------------------------------------------------------------

/// A flat row-major 2-D buffer. Pixel `(x, y)` lives at index `y * width + x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer2D<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Copy> Buffer2D<T> {
    /// Create a buffer filled with a single value.
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            data: vec![fill; width * height],
        }
    }

    /// Create a buffer from an existing row-major vector.
    ///
    /// Fails with [`EngineError::MalformedInput`] if the vector length does
    /// not equal `width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, EngineError> {
        if data.len() != width * height {
            return Err(EngineError::MalformedInput(format!(
                "buffer length {} does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Flat index of pixel `(x, y)`. Callers must validate bounds first.
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Value at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// Overwrite the value at `(x, y)`. Out-of-bounds writes are ignored and
    /// reported via the return value.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> bool {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
            true
        } else {
            false
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Whether the internal vector length matches the declared dimensions.
    ///
    /// Buffers built by this crate always are; buffers deserialized from an
    /// external payload must be checked before any index arithmetic.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width * self.height
    }
}

// ---------------------------------------------------------------------------
// Stack shape
// ---------------------------------------------------------------------------

/// Dimensions of a project's frame stacks, fixed at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackShape {
    /// Number of frames in the stack.
    pub frames: usize,
    /// Pixel rows per frame.
    pub height: usize,
    /// Pixel columns per frame.
    pub width: usize,
    /// Raw intensity channels per frame.
    pub channels: usize,
    /// Label features per frame.
    pub features: usize,
}

// ---------------------------------------------------------------------------
// FrameStore
// ---------------------------------------------------------------------------

/// Owns the raw and label stacks for one project.
///
/// Raw slices are indexed by `(frame, channel)` and are read-only after
/// ingest; label slices are indexed by `(frame, feature)` and are the only
/// data mutated by edit actions. All index arguments are validated; an
/// out-of-range index fails with [`EngineError::OutOfBounds`], never clamps.
#[derive(Debug, Clone)]
pub struct FrameStore {
    shape: StackShape,
    /// Raw slices, frame-major: index `frame * channels + channel`.
    raw: Vec<Buffer2D<f32>>,
    /// Label slices, frame-major: index `frame * features + feature`.
    labels: Vec<Buffer2D<LabelId>>,
}

impl FrameStore {
    /// Build a store from per-frame raw and label slices.
    ///
    /// `raw[frame][channel]` and `labels[frame][feature]` must be rectangular
    /// (every frame the same channel/feature count) and every buffer must
    /// share the same spatial dimensions. Violations fail with
    /// [`EngineError::MalformedInput`].
    pub fn new(
        raw: Vec<Vec<Buffer2D<f32>>>,
        labels: Vec<Vec<Buffer2D<LabelId>>>,
    ) -> Result<Self, EngineError> {
        if raw.is_empty() || labels.is_empty() {
            return Err(EngineError::MalformedInput(
                "a project needs at least one raw and one label frame".to_string(),
            ));
        }
        if raw.len() != labels.len() {
            return Err(EngineError::MalformedInput(format!(
                "raw stack has {} frames but label stack has {}",
                raw.len(),
                labels.len()
            )));
        }

        let frames = raw.len();
        let channels = raw[0].len();
        let features = labels[0].len();
        if channels == 0 || features == 0 {
            return Err(EngineError::MalformedInput(
                "a project needs at least one channel and one feature".to_string(),
            ));
        }

        let width = raw[0][0].width();
        let height = raw[0][0].height();
        if width == 0 || height == 0 {
            return Err(EngineError::MalformedInput(
                "frames must have nonzero spatial dimensions".to_string(),
            ));
        }

        let mut flat_raw = Vec::with_capacity(frames * channels);
        for (f, frame) in raw.into_iter().enumerate() {
            if frame.len() != channels {
                return Err(EngineError::MalformedInput(format!(
                    "raw frame {f} has {} channels, expected {channels}",
                    frame.len()
                )));
            }
            for (c, buf) in frame.into_iter().enumerate() {
                check_dims("raw", f, c, &buf.shape(), width, height)?;
                if !buf.is_consistent() {
                    return Err(EngineError::MalformedInput(format!(
                        "raw slice ({f}, {c}) has an inconsistent buffer length"
                    )));
                }
                flat_raw.push(buf);
            }
        }

        let mut flat_labels = Vec::with_capacity(frames * features);
        for (f, frame) in labels.into_iter().enumerate() {
            if frame.len() != features {
                return Err(EngineError::MalformedInput(format!(
                    "label frame {f} has {} features, expected {features}",
                    frame.len()
                )));
            }
            for (ft, buf) in frame.into_iter().enumerate() {
                check_dims("label", f, ft, &buf.shape(), width, height)?;
                if !buf.is_consistent() {
                    return Err(EngineError::MalformedInput(format!(
                        "label slice ({f}, {ft}) has an inconsistent buffer length"
                    )));
                }
                flat_labels.push(buf);
            }
        }

        Ok(Self {
            shape: StackShape {
                frames,
                height,
                width,
                channels,
                features,
            },
            raw: flat_raw,
            labels: flat_labels,
        })
    }

    pub fn shape(&self) -> StackShape {
        self.shape
    }

    /// Validate a frame index.
    pub fn check_frame(&self, frame: usize) -> Result<(), EngineError> {
        if frame >= self.shape.frames {
            return Err(EngineError::OutOfBounds {
                what: "frame",
                index: frame,
                extent: self.shape.frames,
            });
        }
        Ok(())
    }

    /// Validate a raw channel index.
    pub fn check_channel(&self, channel: usize) -> Result<(), EngineError> {
        if channel >= self.shape.channels {
            return Err(EngineError::OutOfBounds {
                what: "channel",
                index: channel,
                extent: self.shape.channels,
            });
        }
        Ok(())
    }

    /// Validate a label feature index.
    pub fn check_feature(&self, feature: usize) -> Result<(), EngineError> {
        if feature >= self.shape.features {
            return Err(EngineError::OutOfBounds {
                what: "feature",
                index: feature,
                extent: self.shape.features,
            });
        }
        Ok(())
    }

    /// Validate a pixel coordinate.
    pub fn check_point(&self, x: usize, y: usize) -> Result<(), EngineError> {
        if x >= self.shape.width {
            return Err(EngineError::OutOfBounds {
                what: "x",
                index: x,
                extent: self.shape.width,
            });
        }
        if y >= self.shape.height {
            return Err(EngineError::OutOfBounds {
                what: "y",
                index: y,
                extent: self.shape.height,
            });
        }
        Ok(())
    }

    /// Read-only raw intensity slice.
    pub fn raw(&self, frame: usize, channel: usize) -> Result<&Buffer2D<f32>, EngineError> {
        self.check_frame(frame)?;
        self.check_channel(channel)?;
        Ok(&self.raw[frame * self.shape.channels + channel])
    }

    /// Read-only label slice.
    pub fn labels(&self, frame: usize, feature: usize) -> Result<&Buffer2D<LabelId>, EngineError> {
        self.check_frame(frame)?;
        self.check_feature(feature)?;
        Ok(&self.labels[frame * self.shape.features + feature])
    }

    /// Mutable label slice.
    pub fn labels_mut(
        &mut self,
        frame: usize,
        feature: usize,
    ) -> Result<&mut Buffer2D<LabelId>, EngineError> {
        self.check_frame(frame)?;
        self.check_feature(feature)?;
        Ok(&mut self.labels[frame * self.shape.features + feature])
    }

    /// Whole-slice label replacement.
    ///
    /// The replacement must match the store's spatial dimensions; a mismatch
    /// fails with [`EngineError::MalformedInput`] and leaves the slice
    /// untouched.
    pub fn set_labels(
        &mut self,
        frame: usize,
        feature: usize,
        buf: Buffer2D<LabelId>,
    ) -> Result<(), EngineError> {
        self.check_frame(frame)?;
        self.check_feature(feature)?;
        if buf.width() != self.shape.width || buf.height() != self.shape.height {
            return Err(EngineError::MalformedInput(format!(
                "replacement slice is {}x{}, expected {}x{}",
                buf.width(),
                buf.height(),
                self.shape.width,
                self.shape.height
            )));
        }
        if !buf.is_consistent() {
            return Err(EngineError::MalformedInput(
                "replacement slice has an inconsistent buffer length".to_string(),
            ));
        }
        self.labels[frame * self.shape.features + feature] = buf;
        Ok(())
    }
}

impl<T: Copy> Buffer2D<T> {
    fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

fn check_dims(
    kind: &str,
    frame: usize,
    index: usize,
    dims: &(usize, usize),
    width: usize,
    height: usize,
) -> Result<(), EngineError> {
    if dims.0 != width || dims.1 != height {
        return Err(EngineError::MalformedInput(format!(
            "{kind} slice ({frame}, {index}) is {}x{}, expected {width}x{height}",
            dims.0, dims.1
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
