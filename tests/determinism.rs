use reelcast::card::chapter_card;
use reelcast::emphasis::{align, DEFAULT_MARKER};
use reelcast::format::VideoFormat;
use reelcast::layout::{layout_phrase, BoxGlyphs, PhraseLayout};
use reelcast::media::Visual;
use reelcast::phrase::{chunk_phrases, style_words, TRAILING_BUFFER_SECONDS};
use reelcast::renderer::Renderer;
use reelcast::reveal::render_caption;
use reelcast::style::{Rgba8, StyleTable};
use reelcast::timeline::{CaptionClip, PhaseKind, TimelinePlan, VideoPhase, VisualCut};
use reelcast::timing::TimingSource;

fn messi_layout(highlight: bool) -> PhraseLayout {
    let timing = TimingSource::uniform("Lionel Messi scored 91 goals", 2.5);
    let aligned = align("Lionel *Messi* scored *91* goals", &timing, DEFAULT_MARKER);
    let styled = style_words(&aligned, &StyleTable::default(), None);
    let phrases = chunk_phrases(&styled, 5, TRAILING_BUFFER_SECONDS);
    layout_phrase(&phrases[0], &BoxGlyphs, &VideoFormat::Long.frame(), highlight)
}

#[test]
fn caption_frames_are_stable_across_calls() {
    let layout = messi_layout(true);
    let first = caption_hash(&layout, 0.75);
    let second = caption_hash(&layout, 0.75);
    assert_eq!(first, second, "same layout and time must render identically");
}

#[test]
fn caption_frames_do_not_depend_on_call_order() {
    let layout = messi_layout(true);
    let times = [0.0, 0.3, 0.75, 1.2, 2.9];
    let forward = times
        .iter()
        .map(|t| caption_hash(&layout, *t))
        .collect::<Vec<_>>();
    let mut backward = times
        .iter()
        .rev()
        .map(|t| caption_hash(&layout, *t))
        .collect::<Vec<_>>();
    backward.reverse();
    assert_eq!(forward, backward);
    assert_ne!(forward[1], forward[4], "reveal progress should change the frame");
}

#[test]
fn highlight_changes_only_the_active_instant() {
    let plain = messi_layout(false);
    let highlighted = messi_layout(true);
    assert_ne!(caption_hash(&plain, 0.75), caption_hash(&highlighted, 0.75));
    assert_eq!(caption_hash(&plain, 3.0), caption_hash(&highlighted, 3.0));
}

#[test]
fn composed_frames_are_stable() {
    let timing = TimingSource::uniform("Forty nine games unbeaten", 2.0);
    let styled = style_words(&timing, &StyleTable::default(), None);
    let phrase = chunk_phrases(&styled, 5, TRAILING_BUFFER_SECONDS).remove(0);
    let plan = TimelinePlan {
        format: VideoFormat::Long,
        fps: 4,
        phases: vec![VideoPhase {
            id: "outro".to_owned(),
            kind: PhaseKind::Outro,
            label: None,
            audio: None,
            cuts: vec![VisualCut {
                visual: Visual::Solid(Rgba8::rgb(20, 40, 60)),
                offset: 0.0,
                duration: 2.0,
                zoom: 0.04,
            }],
            start: 0.0,
            duration: 2.0,
            headline: Some(chapter_card("THANKS FOR WATCHING", "SUBSCRIBE FOR MORE")),
            captions: vec![CaptionClip {
                start: 0.0,
                duration: phrase.duration(),
                phrase,
            }],
        }],
        total_duration: 2.0,
        highlight: true,
    };

    let mut first = Renderer::new(&plan, &BoxGlyphs, Rgba8::BLACK);
    let mut second = Renderer::new(&plan, &BoxGlyphs, Rgba8::BLACK);
    for frame in 0..plan.total_frames() {
        let a = fnv1a64(&first.render_frame_rgba(frame).expect("render"));
        let b = fnv1a64(&second.render_frame_rgba(frame).expect("render"));
        assert_eq!(a, b, "frame {frame} differs between renderers");
    }
}

fn caption_hash(layout: &PhraseLayout, t: f64) -> u64 {
    let frame = render_caption(layout, t).expect("caption renders");
    fnv1a64(frame.pixmap().data())
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0001_0000_01b3);
    }
    hash
}
