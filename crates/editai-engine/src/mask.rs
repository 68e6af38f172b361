use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use editai_contracts::uploads::UploadedAsset;

use crate::raster::{encode_rgba_png, probe_dimensions};

/// Colour of painted pixels in [`MaskEditor::export_png`].
const OVERLAY_COLOR: [u8; 3] = [255, 255, 255];
pub const DEFAULT_RADIUS: f32 = 20.0;
pub const MASK_FILE_NAME: &str = "mask.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Brush,
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
    Leave,
}

/// Freehand mask canvas, one alpha byte per pixel of the source image.
///
/// Pointer positions arrive in display coordinates and are rescaled to the
/// canvas on each axis, so a canvas shown at a different size still paints
/// under the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskEditor {
    width: u32,
    height: u32,
    display: (f32, f32),
    alpha: Vec<u8>,
    tool: Tool,
    radius: f32,
    last: Option<Point>,
    strokes: usize,
}

impl MaskEditor {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("mask canvas must not be empty ({width}x{height})");
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .context("mask canvas too large")?;
        Ok(Self {
            width,
            height,
            display: (width as f32, height as f32),
            alpha: vec![0; len],
            tool: Tool::Brush,
            radius: DEFAULT_RADIUS,
            last: None,
            strokes: 0,
        })
    }

    /// Canvas sized to the decoded dimensions of `source`.
    pub fn for_source(source: &UploadedAsset) -> Result<Self> {
        let (width, height) = probe_dimensions(&source.bytes)
            .with_context(|| format!("cannot size a mask for {}", source.file_name))?;
        Self::new(width, height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn set_display_size(&mut self, width: f32, height: f32) -> Result<()> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            bail!("display size must be positive, got {width}x{height}");
        }
        self.display = (width, height);
        Ok(())
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = if radius.is_finite() { radius.max(1.0) } else { 1.0 };
    }

    pub fn is_drawing(&self) -> bool {
        self.last.is_some()
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes
    }

    pub fn to_canvas(&self, point: Point) -> Point {
        Point {
            x: point.x * self.width as f32 / self.display.0,
            y: point.y * self.height as f32 / self.display.1,
        }
    }

    pub fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down(point) => {
                let point = self.to_canvas(point);
                self.paint_segment(point, point);
                self.last = Some(point);
                self.strokes += 1;
            }
            PointerEvent::Move(point) => {
                let Some(last) = self.last else {
                    return;
                };
                let point = self.to_canvas(point);
                self.paint_segment(last, point);
                self.last = Some(point);
            }
            PointerEvent::Up | PointerEvent::Leave => {
                self.last = None;
            }
        }
    }

    /// Down on the first point, moves through the rest, then up.
    pub fn paint_stroke(&mut self, points: &[Point]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.handle(PointerEvent::Down(*first));
        for point in rest {
            self.handle(PointerEvent::Move(*point));
        }
        self.handle(PointerEvent::Up);
    }

    pub fn clear(&mut self) {
        self.alpha.fill(0);
        self.last = None;
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.alpha
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn painted_pixels(&self) -> usize {
        self.alpha.iter().filter(|value| **value > 0).count()
    }

    /// The canvas as drawn: overlay colour where painted, transparent elsewhere.
    pub fn export_png(&self) -> Result<Vec<u8>> {
        let mut pixels = Vec::with_capacity(self.alpha.len() * 4);
        for alpha in &self.alpha {
            pixels.extend_from_slice(&OVERLAY_COLOR);
            pixels.push(*alpha);
        }
        encode_rgba_png(self.width, self.height, pixels)
    }

    /// Mask in the shape the edits endpoint expects: painted pixels become
    /// fully transparent (the area to regenerate), the rest opaque black.
    pub fn export_edit_mask(&self) -> Result<Vec<u8>> {
        let mut pixels = Vec::with_capacity(self.alpha.len() * 4);
        for alpha in &self.alpha {
            pixels.extend_from_slice(&[0, 0, 0, 255 - *alpha]);
        }
        encode_rgba_png(self.width, self.height, pixels)
    }

    pub fn edit_mask_asset(&self) -> Result<UploadedAsset> {
        Ok(UploadedAsset::new(
            MASK_FILE_NAME,
            "image/png",
            self.export_edit_mask()?,
        ))
    }

    pub fn run_script(&mut self, script: &MaskScript) -> Result<()> {
        if let Some(display) = script.display {
            self.set_display_size(display.width, display.height)?;
        }
        for action in &script.actions {
            match action {
                MaskAction::Tool { tool } => self.set_tool(*tool),
                MaskAction::Radius { radius } => self.set_radius(*radius),
                MaskAction::Down { x, y } => self.handle(PointerEvent::Down(Point::new(*x, *y))),
                MaskAction::Move { x, y } => self.handle(PointerEvent::Move(Point::new(*x, *y))),
                MaskAction::Up => self.handle(PointerEvent::Up),
                MaskAction::Leave => self.handle(PointerEvent::Leave),
                MaskAction::Clear => self.clear(),
                MaskAction::Stroke { points } => {
                    let points: Vec<Point> = points
                        .iter()
                        .map(|[x, y]| Point::new(*x, *y))
                        .collect();
                    self.paint_stroke(&points);
                }
            }
        }
        Ok(())
    }

    /// Capsule from `a` to `b` with round caps; `a == b` stamps a disc.
    fn paint_segment(&mut self, a: Point, b: Point) {
        let value = match self.tool {
            Tool::Brush => 255,
            Tool::Eraser => 0,
        };
        let radius = self.radius;
        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let x0 = ((a.x.min(b.x) - radius).floor() as i64).max(0);
        let x1 = ((a.x.max(b.x) + radius).ceil() as i64).min(max_x);
        let y0 = ((a.y.min(b.y) - radius).floor() as i64).max(0);
        let y1 = ((a.y.max(b.y) + radius).ceil() as i64).min(max_y);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let row = self.width as usize;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(center, a, b) <= radius {
                    self.alpha[y as usize * row + x as usize] = value;
                }
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let len2 = abx * abx + aby * aby;
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + abx * t, a.y + aby * t);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

/// Recorded pointer session, e.g.
/// `{"display": {"width": 512, "height": 512}, "actions": [{"op": "radius", "radius": 12},
/// {"op": "stroke", "points": [[10, 10], [200, 40]]}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplaySize>,
    #[serde(default)]
    pub actions: Vec<MaskAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MaskAction {
    Tool { tool: Tool },
    Radius { radius: f32 },
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    Leave,
    Clear,
    Stroke { points: Vec<[f32; 2]> },
}

impl MaskScript {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid mask script")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use editai_contracts::uploads::UploadedAsset;

    use super::{MaskEditor, MaskScript, Point, PointerEvent, Tool};
    use crate::raster::{probe_dimensions, solid_png};

    #[test]
    fn export_dimensions_follow_source() -> anyhow::Result<()> {
        for (width, height) in [(1, 1), (16, 9), (9, 16), (64, 64), (257, 31)] {
            let source = UploadedAsset::new("src.png", "image/png", solid_png(width, height, [9, 9, 9])?);
            let mut editor = MaskEditor::for_source(&source)?;
            editor.paint_stroke(&[Point::new(0.0, 0.0), Point::new(width as f32, height as f32)]);
            assert_eq!(probe_dimensions(&editor.export_png()?)?, (width, height));
            assert_eq!(probe_dimensions(&editor.export_edit_mask()?)?, (width, height));
        }
        Ok(())
    }

    #[test]
    fn down_stamps_a_disc() -> anyhow::Result<()> {
        let mut editor = MaskEditor::new(40, 40)?;
        editor.set_radius(3.0);
        editor.handle(PointerEvent::Down(Point::new(20.0, 20.0)));
        assert!(editor.is_drawing());
        assert_eq!(editor.alpha_at(20, 20), Some(255));
        assert_eq!(editor.alpha_at(20, 25), Some(0));
        editor.handle(PointerEvent::Leave);
        assert!(!editor.is_drawing());

        editor.handle(PointerEvent::Move(Point::new(35.0, 35.0)));
        assert_eq!(editor.alpha_at(35, 35), Some(0));
        Ok(())
    }

    #[test]
    fn move_paints_a_continuous_capsule() -> anyhow::Result<()> {
        let mut editor = MaskEditor::new(100, 20)?;
        editor.set_radius(2.0);
        editor.paint_stroke(&[Point::new(5.0, 10.0), Point::new(95.0, 10.0)]);
        for x in 5..95 {
            assert_eq!(editor.alpha_at(x, 10), Some(255), "gap at x={x}");
        }
        assert_eq!(editor.alpha_at(50, 2), Some(0));
        assert_eq!(editor.stroke_count(), 1);
        Ok(())
    }

    #[test]
    fn display_coordinates_are_rescaled() -> anyhow::Result<()> {
        let mut editor = MaskEditor::new(200, 100)?;
        editor.set_display_size(100.0, 50.0)?;
        editor.set_radius(1.0);
        assert_eq!(editor.to_canvas(Point::new(50.0, 25.0)), Point::new(100.0, 50.0));
        editor.handle(PointerEvent::Down(Point::new(50.0, 25.0)));
        assert_eq!(editor.alpha_at(100, 50), Some(255));
        assert_eq!(editor.alpha_at(50, 25), Some(0));
        assert!(editor.set_display_size(0.0, 10.0).is_err());
        Ok(())
    }

    #[test]
    fn eraser_and_clear_remove_paint() -> anyhow::Result<()> {
        let mut editor = MaskEditor::new(30, 30)?;
        editor.set_radius(5.0);
        editor.paint_stroke(&[Point::new(15.0, 15.0)]);
        assert!(editor.painted_pixels() > 0);

        editor.set_tool(Tool::Eraser);
        editor.set_radius(0.2);
        assert_eq!(editor.radius(), 1.0);
        editor.paint_stroke(&[Point::new(15.0, 15.0)]);
        assert_eq!(editor.alpha_at(15, 15), Some(0));
        assert!(editor.painted_pixels() > 0);

        editor.clear();
        assert_eq!(editor.painted_pixels(), 0);
        Ok(())
    }

    #[test]
    fn edit_mask_inverts_painted_alpha() -> anyhow::Result<()> {
        let mut editor = MaskEditor::new(4, 1)?;
        editor.set_radius(1.0);
        editor.paint_stroke(&[Point::new(0.5, 0.5)]);
        let decoded = image::load_from_memory(&editor.export_edit_mask()?)?.to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0[3], 0);
        assert_eq!(decoded.get_pixel(3, 0).0[3], 255);

        let overlay = image::load_from_memory(&editor.export_png()?)?.to_rgba8();
        assert_eq!(overlay.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(overlay.get_pixel(3, 0).0[3], 0);
        Ok(())
    }

    #[test]
    fn script_drives_the_editor() -> anyhow::Result<()> {
        let script = MaskScript::from_json(
            r#"{
                "display": {"width": 10, "height": 10},
                "actions": [
                    {"op": "radius", "radius": 1},
                    {"op": "stroke", "points": [[1, 1], [8, 1]]},
                    {"op": "tool", "tool": "eraser"},
                    {"op": "down", "x": 8, "y": 1},
                    {"op": "up"}
                ]
            }"#,
        )?;
        let mut editor = MaskEditor::new(20, 20)?;
        editor.run_script(&script)?;
        assert_eq!(editor.tool(), Tool::Eraser);
        assert_eq!(editor.alpha_at(6, 2), Some(255));
        assert_eq!(editor.alpha_at(16, 2), Some(0));
        assert_eq!(editor.stroke_count(), 2);

        assert!(MaskScript::from_json(r#"{"actions": [{"op": "spin"}]}"#).is_err());
        Ok(())
    }
}
