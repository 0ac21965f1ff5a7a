//! Pixel-to-area calibration from a user-drawn reference line.
//!
//! The user draws a line over an object of known length on a preview
//! that may be scaled relative to the stored image. The endpoints are
//! mapped back to source pixels, the line's source length gives a
//! centimetres-per-pixel ratio, and squaring it gives the area one
//! source pixel covers.

use image::Rgb;
use imageproc::drawing::draw_line_segment_mut;
use serde::{Deserialize, Serialize};

use crate::types::{CalibrationError, Dimensions, Point, RgbImage};

/// Real-world area, in cm², covered by one source pixel.
///
/// Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct AreaPerPixel(f64);

impl AreaPerPixel {
    /// Wrap a calibration constant.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidAreaPerPixel`] unless `value`
    /// is positive and finite.
    pub fn new(value: f64) -> Result<Self, CalibrationError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(CalibrationError::InvalidAreaPerPixel(value))
        }
    }

    /// The constant in cm² per pixel.
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for AreaPerPixel {
    type Error = CalibrationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AreaPerPixel> for f64 {
    fn from(value: AreaPerPixel) -> Self {
        value.0
    }
}

/// Map a point on the display surface to source image pixels.
///
/// # Errors
///
/// Returns [`CalibrationError::InvalidDisplay`] if the display has a
/// zero dimension.
pub fn to_source_coordinates(
    display_point: Point,
    source: Dimensions,
    display: Dimensions,
) -> Result<Point, CalibrationError> {
    if display.width == 0 || display.height == 0 {
        return Err(CalibrationError::InvalidDisplay(display));
    }
    Ok(Point::new(
        display_point.x / f64::from(display.width) * f64::from(source.width),
        display_point.y / f64::from(display.height) * f64::from(source.height),
    ))
}

/// Area per pixel from a reference of known length.
///
/// Returns `(real_length_cm / pixel_length)²`.
///
/// # Errors
///
/// Returns [`CalibrationError::ZeroLengthReference`] if `pixel_length`
/// is not positive and [`CalibrationError::InvalidRealLength`] if
/// `real_length_cm` is not positive.
pub fn compute_area_per_pixel(
    real_length_cm: f64,
    pixel_length: f64,
) -> Result<AreaPerPixel, CalibrationError> {
    if !(real_length_cm.is_finite() && real_length_cm > 0.0) {
        return Err(CalibrationError::InvalidRealLength(real_length_cm));
    }
    if !(pixel_length.is_finite() && pixel_length > 0.0) {
        return Err(CalibrationError::ZeroLengthReference);
    }
    let cm_per_pixel = real_length_cm / pixel_length;
    AreaPerPixel::new(cm_per_pixel * cm_per_pixel)
}

/// A completed reference line, in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    /// Where the drag started.
    pub start: Point,
    /// Where the drag ended.
    pub end: Point,
    /// Size the image was rendered at while drawing.
    pub display: Dimensions,
    /// True size of the source image.
    pub source: Dimensions,
}

impl ReferenceLine {
    /// Both endpoints in source pixels.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidDisplay`] for a zero-sized display.
    pub fn source_endpoints(&self) -> Result<(Point, Point), CalibrationError> {
        Ok((
            to_source_coordinates(self.start, self.source, self.display)?,
            to_source_coordinates(self.end, self.source, self.display)?,
        ))
    }

    /// Length of the line in source pixels.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidDisplay`] for a zero-sized display.
    pub fn pixel_length(&self) -> Result<f64, CalibrationError> {
        let (a, b) = self.source_endpoints()?;
        Ok(a.distance(b))
    }

    /// Derive the calibration constant for a reference of `real_length_cm`.
    ///
    /// # Errors
    ///
    /// See [`compute_area_per_pixel`] and [`Self::pixel_length`].
    pub fn calibrate(&self, real_length_cm: f64) -> Result<AreaPerPixel, CalibrationError> {
        let pixels = self.pixel_length()?;
        log::debug!("reference line is {pixels:.2} source px for {real_length_cm} cm");
        compute_area_per_pixel(real_length_cm, pixels)
    }
}

/// Pointer input on the display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Button pressed at a point.
    Press(Point),
    /// Pointer moved with the button held.
    Drag(Point),
    /// Button released at a point.
    Release(Point),
}

/// Turns a stream of pointer events into a [`ReferenceLine`].
///
/// Feed every event to [`handle`](Self::handle); it returns the line once
/// a press is followed by a release. A new press discards any drag in
/// progress.
#[derive(Debug, Clone)]
pub struct ReferenceLineTracker {
    display: Dimensions,
    source: Dimensions,
    start: Option<Point>,
    current: Option<Point>,
}

impl ReferenceLineTracker {
    /// Track drags over a display of `display` size showing a `source`
    /// sized image.
    #[must_use]
    pub const fn new(display: Dimensions, source: Dimensions) -> Self {
        Self {
            display,
            source,
            start: None,
            current: None,
        }
    }

    /// The segment being dragged, for live preview.
    #[must_use]
    pub fn in_progress(&self) -> Option<(Point, Point)> {
        self.start.zip(self.current)
    }

    /// Process one event.
    pub fn handle(&mut self, event: PointerEvent) -> Option<ReferenceLine> {
        match event {
            PointerEvent::Press(p) => {
                self.start = Some(p);
                self.current = Some(p);
                None
            }
            PointerEvent::Drag(p) => {
                if self.start.is_some() {
                    self.current = Some(p);
                }
                None
            }
            PointerEvent::Release(end) => {
                let start = self.start.take()?;
                self.current = None;
                Some(ReferenceLine {
                    start,
                    end,
                    display: self.display,
                    source: self.source,
                })
            }
        }
    }
}

/// Draw the reference line onto a copy of the source image.
///
/// # Errors
///
/// Returns [`CalibrationError::InvalidDisplay`] for a zero-sized display.
#[allow(clippy::cast_possible_truncation)]
pub fn draw_reference_line(
    source: &RgbImage,
    line: &ReferenceLine,
    color: [u8; 3],
) -> Result<RgbImage, CalibrationError> {
    let (a, b) = line.source_endpoints()?;
    let mut annotated = source.clone();
    draw_line_segment_mut(
        &mut annotated,
        (a.x as f32, a.y as f32),
        (b.x as f32, b.y as f32),
        Rgb(color),
    );
    Ok(annotated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn area_per_pixel_is_squared_ratio() {
        let app = compute_area_per_pixel(10.0, 100.0).unwrap();
        assert!((app.get() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn zero_length_reference_is_rejected() {
        assert_eq!(
            compute_area_per_pixel(10.0, 0.0),
            Err(CalibrationError::ZeroLengthReference)
        );
        assert_eq!(
            compute_area_per_pixel(10.0, -3.0),
            Err(CalibrationError::ZeroLengthReference)
        );
    }

    #[test]
    fn non_positive_real_length_is_rejected() {
        assert!(matches!(
            compute_area_per_pixel(0.0, 100.0),
            Err(CalibrationError::InvalidRealLength(_))
        ));
        assert!(compute_area_per_pixel(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn display_to_source_rescale() {
        let p = to_source_coordinates(
            Point::new(160.0, 120.0),
            Dimensions::new(640, 480),
            Dimensions::new(320, 240),
        )
        .unwrap();
        assert_eq!(p, Point::new(320.0, 240.0));
    }

    #[test]
    fn zero_display_is_rejected() {
        assert!(matches!(
            to_source_coordinates(
                Point::new(1.0, 1.0),
                Dimensions::new(640, 480),
                Dimensions::new(0, 240)
            ),
            Err(CalibrationError::InvalidDisplay(_))
        ));
    }

    #[test]
    fn reference_line_measures_in_source_pixels() {
        // 50 display px on a half-size preview is 100 source px.
        let line = ReferenceLine {
            start: Point::new(10.0, 20.0),
            end: Point::new(40.0, 60.0),
            display: Dimensions::new(500, 400),
            source: Dimensions::new(1000, 800),
        };
        assert!((line.pixel_length().unwrap() - 100.0).abs() < 1e-9);
        let app = line.calibrate(10.0).unwrap();
        assert!((app.get() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn degenerate_reference_line_fails() {
        let line = ReferenceLine {
            start: Point::new(5.0, 5.0),
            end: Point::new(5.0, 5.0),
            display: Dimensions::new(100, 100),
            source: Dimensions::new(100, 100),
        };
        assert_eq!(line.calibrate(1.0), Err(CalibrationError::ZeroLengthReference));
    }

    #[test]
    fn area_per_pixel_rejects_sentinel() {
        assert!(AreaPerPixel::new(0.0).is_err());
        assert!(AreaPerPixel::new(-1.0).is_err());
        assert!(AreaPerPixel::new(f64::INFINITY).is_err());
        assert!(serde_json::from_str::<AreaPerPixel>("0.0").is_err());
        let app: AreaPerPixel = serde_json::from_str("0.25").unwrap();
        assert!((app.get() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn tracker_emits_line_on_release() {
        let mut tracker =
            ReferenceLineTracker::new(Dimensions::new(320, 240), Dimensions::new(640, 480));
        assert_eq!(tracker.handle(PointerEvent::Press(Point::new(1.0, 2.0))), None);
        assert_eq!(tracker.handle(PointerEvent::Drag(Point::new(5.0, 2.0))), None);
        assert_eq!(
            tracker.in_progress(),
            Some((Point::new(1.0, 2.0), Point::new(5.0, 2.0)))
        );
        let line = tracker
            .handle(PointerEvent::Release(Point::new(9.0, 2.0)))
            .unwrap();
        assert_eq!(line.start, Point::new(1.0, 2.0));
        assert_eq!(line.end, Point::new(9.0, 2.0));
        assert_eq!(line.source, Dimensions::new(640, 480));
        assert!(tracker.in_progress().is_none());
    }

    #[test]
    fn tracker_ignores_release_without_press() {
        let mut tracker =
            ReferenceLineTracker::new(Dimensions::new(10, 10), Dimensions::new(10, 10));
        assert_eq!(tracker.handle(PointerEvent::Drag(Point::new(1.0, 1.0))), None);
        assert_eq!(tracker.handle(PointerEvent::Release(Point::new(2.0, 2.0))), None);
    }

    #[test]
    fn tracker_restarts_on_new_press() {
        let mut tracker =
            ReferenceLineTracker::new(Dimensions::new(10, 10), Dimensions::new(10, 10));
        tracker.handle(PointerEvent::Press(Point::new(1.0, 1.0)));
        tracker.handle(PointerEvent::Press(Point::new(3.0, 3.0)));
        let line = tracker
            .handle(PointerEvent::Release(Point::new(4.0, 3.0)))
            .unwrap();
        assert_eq!(line.start, Point::new(3.0, 3.0));
    }

    #[test]
    fn draw_reference_line_marks_pixels() {
        let source = RgbImage::new(20, 20);
        let line = ReferenceLine {
            start: Point::new(0.0, 5.0),
            end: Point::new(9.0, 5.0),
            display: Dimensions::new(10, 10),
            source: Dimensions::new(20, 20),
        };
        let annotated = draw_reference_line(&source, &line, [0, 255, 0]).unwrap();
        assert_eq!(annotated.get_pixel(10, 10), &Rgb([0, 255, 0]));
        assert_eq!(annotated.get_pixel(10, 0), &Rgb([0, 0, 0]));
    }
}
