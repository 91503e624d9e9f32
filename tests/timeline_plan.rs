use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::tempdir;

use reelcast::manifest::{load_and_validate_manifest, style_table};
use reelcast::media::{LocalMediaLibrary, NoMedia, Visual};
use reelcast::synthesis::{EstimatedSpeech, SpeechSynthesizer, Synthesis};
use reelcast::timeline::{ComposerSettings, PhaseKind, TimelineComposer};

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should create");
    }
    fs::write(path, contents).expect("file should write");
}

fn long_manifest(root: &Path) -> PathBuf {
    write(&root.join("fonts/caption.ttf"), "not parsed by the planner");
    for name in ["media/arsenal_crowd.jpg", "media/highbury-night.mp4", "media/football_stadium.png"] {
        write(&root.join(name), "x");
    }
    let manifest = root.join("invincibles.yaml");
    write(
        &manifest,
        r#"
environment:
  font: fonts/caption.ttf
  work_dir: work
  fps: 24
media:
  library: media
script:
  metadata: { title: "The Invincibles" }
  hook: { text: "Forty nine games *without* defeat", visual_keyword: arsenal crowd }
  intro: { text: "In 2004 Arsenal did the *impossible*", visual_keyword: arsenal crowd }
  chapters:
    - chapter_title: "Highbury Nights"
      facts:
        - { text: "Henry scored thirty goals", visual_keyword: highbury night }
        - { text: "The crowd never stopped singing", visual_keyword: unknown keyword }
  outro: { text: "Subscribe for more legends", visual_keyword: arsenal crowd }
"#,
    );
    manifest
}

#[test]
fn estimated_long_plan_has_cards_captions_and_media() {
    let dir = tempdir().expect("tempdir");
    let manifest = load_and_validate_manifest(&long_manifest(dir.path())).expect("manifest valid");
    let styles = style_table(&manifest).expect("styles");
    let library = LocalMediaLibrary::open(manifest.media.library.as_deref().expect("library set"))
        .expect("library opens");
    let mut speech = EstimatedSpeech::new(&manifest.environment.work_dir);

    let plan = TimelineComposer::new(
        ComposerSettings::from_manifest(&manifest),
        &styles,
        &mut speech,
        &library,
    )
    .compose(&manifest.script)
    .expect("compose");

    let kinds = plan.phases.iter().map(|p| p.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        [
            PhaseKind::Narrated,
            PhaseKind::Title,
            PhaseKind::Narrated,
            PhaseKind::Transition,
            PhaseKind::Narrated,
            PhaseKind::Narrated,
            PhaseKind::Outro,
        ]
    );
    assert_eq!(plan.fps, 24);

    for phase in &plan.phases {
        if phase.kind == PhaseKind::Narrated || phase.kind == PhaseKind::Outro {
            let artifact = manifest.environment.work_dir.join(format!("{}.json", phase.id));
            assert!(artifact.is_file(), "missing {}", artifact.display());
            assert!(!phase.captions.is_empty(), "{} has no captions", phase.id);
        } else {
            assert!(phase.captions.is_empty());
        }
    }

    let hook_visual = &plan.phases[0].cuts[0].visual;
    assert_eq!(
        hook_visual,
        &Visual::Image(dir.path().join("media/arsenal_crowd.jpg"))
    );
    let fact_visual = &plan.phases[4].cuts[0].visual;
    assert_eq!(
        fact_visual,
        &Visual::Video(dir.path().join("media/highbury-night.mp4"))
    );
    assert!(matches!(
        plan.phases[5].cuts[0].visual,
        Visual::Image(_) | Visual::Video(_)
    ));

    let sum: f64 = plan.phases.iter().map(|p| p.duration).sum();
    assert!((plan.total_duration - sum).abs() < 1e-9);
    assert_eq!(plan.total_frames(), (sum * 24.0).ceil() as u64);

    let markers = plan.chapter_markers();
    assert_eq!(markers, ["00:00 - Intro", "00:08 - Highbury Nights"]);
}

struct NoTiming;

impl SpeechSynthesizer for NoTiming {
    fn synthesize(&mut self, phase_id: &str, _text: &str) -> Result<Synthesis> {
        Ok(Synthesis {
            audio: None,
            duration: 2.0,
            timing_path: Some(PathBuf::from(format!("/nonexistent/reelcast/{phase_id}.json"))),
        })
    }
}

#[test]
fn unreadable_timing_disables_captions_only() {
    let dir = tempdir().expect("tempdir");
    let manifest = load_and_validate_manifest(&long_manifest(dir.path())).expect("manifest valid");
    let styles = style_table(&manifest).expect("styles");
    let mut speech = NoTiming;

    let plan = TimelineComposer::new(
        ComposerSettings::from_manifest(&manifest),
        &styles,
        &mut speech,
        &NoMedia,
    )
    .compose(&manifest.script)
    .expect("compose succeeds without timing");

    assert_eq!(plan.caption_count(), 0);
    assert_eq!(plan.phases.len(), 7);
    let narrated = plan
        .phases
        .iter()
        .filter(|p| p.kind == PhaseKind::Narrated)
        .collect::<Vec<_>>();
    assert!(narrated.iter().all(|p| (p.duration - 2.0).abs() < 1e-9));
    assert!(plan
        .phases
        .iter()
        .all(|p| p.cuts[0].visual == Visual::Solid(manifest.environment.background)));
}

/// Voices every phase but writes an empty timing artifact, as an engine that
/// produced no word boundaries would.
struct EmptyTiming {
    dir: PathBuf,
}

impl SpeechSynthesizer for EmptyTiming {
    fn synthesize(&mut self, phase_id: &str, _text: &str) -> Result<Synthesis> {
        let timing_path = self.dir.join(format!("{phase_id}.json"));
        fs::write(&timing_path, "[]")?;
        Ok(Synthesis {
            audio: Some(self.dir.join(format!("{phase_id}.mp3"))),
            duration: 2.0,
            timing_path: Some(timing_path),
        })
    }
}

#[test]
fn empty_timing_keeps_audio_and_visuals_without_captions() {
    let dir = tempdir().expect("tempdir");
    let manifest = load_and_validate_manifest(&long_manifest(dir.path())).expect("manifest valid");
    let styles = style_table(&manifest).expect("styles");
    let library = LocalMediaLibrary::open(manifest.media.library.as_deref().expect("library set"))
        .expect("library opens");
    let mut speech = EmptyTiming {
        dir: dir.path().to_path_buf(),
    };

    let plan = TimelineComposer::new(
        ComposerSettings::from_manifest(&manifest),
        &styles,
        &mut speech,
        &library,
    )
    .compose(&manifest.script)
    .expect("compose succeeds with empty timing");

    assert_eq!(plan.caption_count(), 0);
    for phase in plan
        .phases
        .iter()
        .filter(|p| p.kind == PhaseKind::Narrated || p.kind == PhaseKind::Outro)
    {
        assert!((phase.duration - 2.0).abs() < 1e-9, "{}", phase.id);
        assert_eq!(
            phase.audio.as_deref(),
            Some(dir.path().join(format!("{}.mp3", phase.id)).as_path())
        );
    }
    assert_eq!(
        plan.phases[0].cuts[0].visual,
        Visual::Image(dir.path().join("media/arsenal_crowd.jpg"))
    );
    assert_eq!(
        plan.phases[4].cuts[0].visual,
        Visual::Video(dir.path().join("media/highbury-night.mp4"))
    );
}

#[test]
fn short_segments_are_cut_every_three_seconds() {
    let dir = tempdir().expect("tempdir");
    write(&dir.path().join("font.ttf"), "x");
    write(&dir.path().join("media/messi_goal.mp4"), "x");
    write(&dir.path().join("media/messi_dribble.jpg"), "x");
    let manifest_path = dir.path().join("short.yaml");
    write(
        &manifest_path,
        r#"
environment: { font: font.ttf }
media: { library: media }
script:
  title: messi
  hook: "Nobody can stop *Messi*"
  segments:
    - { text: "He dribbled past five defenders in one run and then chipped the keeper with great ease", visual_keyword: messi }
  outro: "Follow for more"
"#,
    );
    let manifest = load_and_validate_manifest(&manifest_path).expect("manifest valid");
    let styles = style_table(&manifest).expect("styles");
    let library = LocalMediaLibrary::open(&dir.path().join("media")).expect("library");
    let mut speech = EstimatedSpeech::new(&manifest.environment.work_dir);

    let plan = TimelineComposer::new(
        ComposerSettings::from_manifest(&manifest),
        &styles,
        &mut speech,
        &library,
    )
    .compose(&manifest.script)
    .expect("compose");

    let hook = &plan.phases[0];
    assert!(hook.captions.is_empty());
    assert!(hook.headline.is_some());

    let segment = &plan.phases[1];
    assert!((segment.duration - 6.4).abs() < 1e-9);
    let offsets = segment.cuts.iter().map(|c| c.offset).collect::<Vec<_>>();
    assert_eq!(offsets, [0.0, 3.0, 6.0]);
    assert!(segment.cuts.iter().all(|c| (c.zoom - 0.1).abs() < 1e-6));
    assert_ne!(segment.cuts[0].visual, segment.cuts[1].visual);
    assert_eq!(segment.captions.len(), 6);
}
