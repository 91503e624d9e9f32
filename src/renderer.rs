use anyhow::{anyhow, Result};
use tiny_skia::{Pixmap, PixmapPaint, Transform};
use tracing::debug;

use crate::background::{open_background, BackgroundSource, SolidBackground};
use crate::card::render_headline;
use crate::format::FrameSpec;
use crate::layout::{layout_phrase, GlyphSource, PhraseLayout};
use crate::reveal::{render_caption, CaptionFrame};
use crate::style::Rgba8;
use crate::timeline::TimelinePlan;

struct ActivePhase {
    index: usize,
    cut: usize,
    background: Box<dyn BackgroundSource>,
    headline: Option<CaptionFrame>,
    caption: Option<(usize, PhraseLayout)>,
}

/// Draws output frames for a plan in order: background, then headline card,
/// then the caption clip active at that instant.
pub struct Renderer<'a> {
    plan: &'a TimelinePlan,
    glyphs: &'a dyn GlyphSource,
    frame: FrameSpec,
    matte: Rgba8,
    active: Option<ActivePhase>,
}

impl<'a> Renderer<'a> {
    pub fn new(plan: &'a TimelinePlan, glyphs: &'a dyn GlyphSource, matte: Rgba8) -> Self {
        Self {
            plan,
            glyphs,
            frame: plan.format.frame(),
            matte,
            active: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn total_frames(&self) -> u64 {
        self.plan.total_frames()
    }

    pub fn render_frame_rgba(&mut self, frame_index: u64) -> Result<Vec<u8>> {
        Ok(self.render_frame_pixmap(frame_index)?.take())
    }

    pub fn render_frame_pixmap(&mut self, frame_index: u64) -> Result<Pixmap> {
        let plan = self.plan;
        let t = frame_index as f64 / f64::from(plan.fps);
        let phase_index = plan
            .phase_at(t)
            .ok_or_else(|| anyhow!("cannot render an empty timeline"))?;
        let phase = &plan.phases[phase_index];
        let local_t = (t - phase.start).max(0.0);

        let cut_index = phase.cut_index_at(local_t).unwrap_or(0);
        self.activate(phase_index, cut_index)?;
        let glyphs = self.glyphs;
        let frame = self.frame;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("no active phase for frame {frame_index}"))?;

        let cut_offset = phase.cuts.get(cut_index).map_or(0.0, |cut| cut.offset);
        let mut canvas = active.background.frame(local_t - cut_offset)?;

        if let Some(headline) = &active.headline {
            draw_layer(&mut canvas, headline);
        }

        let clip_index = phase
            .captions
            .iter()
            .position(|clip| t >= clip.start && t < clip.end());
        match clip_index {
            Some(index) => {
                let clip = &phase.captions[index];
                let reuse = matches!(&active.caption, Some((cached, _)) if *cached == index);
                if !reuse {
                    let layout = layout_phrase(&clip.phrase, glyphs, &frame, plan.highlight);
                    active.caption = Some((index, layout));
                }
                if let Some((_, layout)) = &active.caption {
                    let caption = render_caption(layout, t - clip.start)?;
                    draw_layer(&mut canvas, &caption);
                }
            }
            None => active.caption = None,
        }

        Ok(canvas)
    }

    /// Release the open background, e.g. a running decoder.
    pub fn finish(&mut self) -> Result<()> {
        match self.active.take() {
            Some(mut active) => active.background.close(),
            None => Ok(()),
        }
    }

    fn activate(&mut self, phase_index: usize, cut_index: usize) -> Result<()> {
        let same_phase = matches!(&self.active, Some(active) if active.index == phase_index);
        if same_phase {
            let current_cut = self.active.as_ref().map(|active| active.cut);
            if current_cut != Some(cut_index) {
                let background = self.open_cut(phase_index, cut_index);
                if let Some(active) = self.active.as_mut() {
                    active.background.close()?;
                    active.background = background;
                    active.cut = cut_index;
                }
            }
            return Ok(());
        }

        self.finish()?;
        let plan = self.plan;
        let phase = &plan.phases[phase_index];
        debug!(phase = %phase.id, "entering phase");
        let headline = match &phase.headline {
            Some(headline) => Some(render_headline(headline, self.glyphs, &self.frame)?),
            None => None,
        };
        self.active = Some(ActivePhase {
            index: phase_index,
            cut: cut_index,
            background: self.open_cut(phase_index, cut_index),
            headline,
            caption: None,
        });
        Ok(())
    }

    fn open_cut(&self, phase_index: usize, cut_index: usize) -> Box<dyn BackgroundSource> {
        let phase = &self.plan.phases[phase_index];
        match phase.cuts.get(cut_index) {
            Some(cut) => open_background(
                cut,
                self.frame.width,
                self.frame.height,
                self.plan.fps,
                self.matte,
            ),
            None => Box::new(SolidBackground::new(
                self.frame.width,
                self.frame.height,
                self.matte,
            )),
        }
    }
}

fn draw_layer(canvas: &mut Pixmap, layer: &CaptionFrame) {
    let bounds = layer.bounds();
    canvas.draw_pixmap(
        bounds.x,
        bounds.y,
        layer.pixmap().as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}
