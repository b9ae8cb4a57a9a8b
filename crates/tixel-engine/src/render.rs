//! Render extraction and renderer backends.
//!
//! The simulation never draws. Once per frame it builds a [`Frame`]: the
//! visible entities (transform + visible [`RenderMeta`]) as [`RenderItem`]s
//! sorted by `(draw_priority, entity)`, plus the camera position. Any
//! [`Renderer`] can consume it. Two are provided: [`NullRenderer`] for
//! headless runs and [`TextRenderer`], a bordered character-grid view for
//! terminals.

use std::collections::HashMap;
use std::io::Write;

use glam::DVec2;
use serde::Serialize;
use tixel_ecs::prelude::*;

/// One drawable entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderItem {
    pub entity: EntityId,
    /// Bottom-left corner in world space.
    pub position: DVec2,
    /// Hitbox size, or zero if the entity has no collider.
    pub size: DVec2,
    pub draw_priority: i32,
    pub texture_id: Option<String>,
}

/// Everything a renderer receives for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub frame: u64,
    pub tick: u64,
    /// Target size in character cells.
    pub resolution: (u32, u32),
    /// World position the view is centred on, if a camera target is set and
    /// still has a transform.
    pub camera: Option<DVec2>,
    pub items: Vec<RenderItem>,
}

/// Collect visible entities in draw order.
pub fn extract_render_items(world: &World) -> Vec<RenderItem> {
    let mut items: Vec<RenderItem> = world
        .iter()
        .filter_map(|(entity, record)| {
            let transform = record.transform.as_ref()?;
            let meta = record.render.as_ref().filter(|m| m.visible)?;
            Some(RenderItem {
                entity,
                position: transform.position,
                size: record.collider.map_or(DVec2::ZERO, |c| c.size()),
                draw_priority: meta.draw_priority,
                texture_id: meta.texture_id.clone(),
            })
        })
        .collect();
    items.sort_by_key(|item| (item.draw_priority, item.entity));
    items
}

// ---------------------------------------------------------------------------
// Renderer trait
// ---------------------------------------------------------------------------

pub trait Renderer {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()>;
}

/// Discards frames, counting them.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: u64,
}

impl Renderer for NullRenderer {
    fn render(&mut self, _frame: &Frame) -> anyhow::Result<()> {
        self.frames += 1;
        Ok(())
    }
}

impl<R: Renderer + ?Sized> Renderer for &mut R {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        (**self).render(frame)
    }
}

// ---------------------------------------------------------------------------
// TextRenderer
// ---------------------------------------------------------------------------

/// Fallback glyphs for untextured entities, cycled by draw position.
const SYMBOLS: &[char] = &[
    '@', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

/// Draws each frame as a bordered grid of characters.
///
/// World y grows upwards; screen rows grow downwards. Texture row 0 is the
/// top of the entity. Entities without a known texture are filled with a
/// single symbol over their hitbox.
pub struct TextRenderer<W: Write> {
    out: W,
    textures: HashMap<String, Vec<Vec<char>>>,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            textures: HashMap::new(),
        }
    }

    pub fn with_texture(mut self, id: impl Into<String>, rows: &[&str]) -> Self {
        self.textures
            .insert(id.into(), rows.iter().map(|r| r.chars().collect()).collect());
        self
    }

    /// Load textures from a JSON object of `name -> [row, row, ...]`.
    pub fn with_textures_json(mut self, json: &str) -> anyhow::Result<Self> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        for (id, rows) in parsed {
            self.textures
                .insert(id, rows.iter().map(|r| r.chars().collect()).collect());
        }
        Ok(self)
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Rasterise `frame` into text, one line per screen row, border included.
    pub fn compose(&self, frame: &Frame) -> String {
        let (w, h) = (frame.resolution.0 as i64, frame.resolution.1 as i64);
        let mut grid = vec![vec![' '; w as usize]; h as usize];

        let camera = frame.camera.unwrap_or(DVec2::ZERO);
        let centre_x = (w / 2 - camera.x.floor() as i64) as f64;
        let centre_y = (h / 2 + camera.y.floor() as i64) as f64;

        for (i, item) in frame.items.iter().enumerate() {
            let screen_x = centre_x + item.position.x;
            let screen_y = centre_y - item.position.y;
            let x0 = screen_x.floor() as i64;
            let x1 = (screen_x + item.size.x).floor() as i64 + 1;
            let y0 = (screen_y - item.size.y).floor() as i64;
            let y1 = screen_y.floor() as i64 + 1;

            let fallback;
            let texture = match item.texture_id.as_ref().and_then(|t| self.textures.get(t)) {
                Some(t) => t,
                None => {
                    let sym = SYMBOLS[i % SYMBOLS.len()];
                    let tw = (x1 - x0).max(1) as usize;
                    let th = (y1 - y0).max(1) as usize;
                    fallback = vec![vec![sym; tw]; th];
                    &fallback
                }
            };

            for y in y0.max(0)..y1.min(h) {
                let Some(row) = texture.get((y - y0) as usize) else {
                    continue;
                };
                for x in x0.max(0)..x1.min(w) {
                    if let Some(c) = row.get((x - x0) as usize) {
                        grid[y as usize][x as usize] = *c;
                    }
                }
            }
        }

        let border = format!("+{}+", "-".repeat(w as usize));
        let mut text = String::with_capacity(((w + 3) * (h + 2)) as usize);
        text.push_str(&border);
        text.push('\n');
        for row in grid {
            text.push('|');
            text.extend(row);
            text.push_str("|\n");
        }
        text.push_str(&border);
        text.push('\n');
        text
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let text = self.compose(frame);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
