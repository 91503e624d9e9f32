use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use reelcast::audio::build_soundtrack;
use reelcast::emphasis::{align, DEFAULT_MARKER};
use reelcast::encoding::{EncoderSettings, FfmpegPipe};
use reelcast::font_assets::FontFace;
use reelcast::format::VideoFormat;
use reelcast::layout::{layout_phrase, BoxGlyphs, GlyphSource};
use reelcast::manifest::{load_and_validate_manifest, style_table};
use reelcast::media::{LocalMediaLibrary, MediaSource, NoMedia};
use reelcast::phrase::{chunk_phrases, style_words, TRAILING_BUFFER_SECONDS};
use reelcast::renderer::Renderer;
use reelcast::reveal::render_caption;
use reelcast::schema::Manifest;
use reelcast::style::StyleTable;
use reelcast::synthesis::{CommandSynthesizer, EstimatedSpeech, SpeechSynthesizer};
use reelcast::timeline::{ComposerSettings, TimelineComposer, TimelinePlan};
use reelcast::timing::TimingSource;

#[derive(Debug, Parser)]
#[command(name = "reelcast")]
#[command(about = "Narrated short-video composer with word-synced captions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a manifest and its font.
    Check { manifest: PathBuf },
    /// Print the phase timeline without rendering.
    Plan {
        manifest: PathBuf,
        /// Estimate speech durations instead of running the TTS engine.
        #[arg(long)]
        estimate: bool,
    },
    /// Render a single caption frame to PNG.
    Preview {
        #[arg(long)]
        timing: PathBuf,
        /// Authoring text, with emphasis markers.
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "short")]
        format: String,
        /// Caption font; fixed-metric boxes when omitted.
        #[arg(long)]
        font: Option<PathBuf>,
        /// Seconds into the utterance.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Voice, compose, render and encode the full video.
    Build {
        manifest: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("REELCAST_GIT_HASH").unwrap_or("unknown"),
        "reelcast starting"
    );

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { manifest } => run_check(&manifest),
        Commands::Plan { manifest, estimate } => run_plan(&manifest, estimate),
        Commands::Preview {
            timing,
            text,
            format,
            font,
            at,
            output,
        } => run_preview(&timing, &text, &format, font.as_deref(), at, &output),
        Commands::Build { manifest, output } => run_build(&manifest, &output),
    }
}

fn run_check(manifest_path: &Path) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let font = FontFace::load(&manifest.environment.font)?;
    font.warn_unsupported_codepoints(&manifest.script.all_text(), "script");

    let format = manifest.format();
    let (width, height) = format.dimensions_px();
    println!(
        "OK: {} ({} form, {}x{}, {} fps)",
        manifest_path.display(),
        format.keyword(),
        width,
        height,
        manifest.environment.fps
    );
    println!("Font: {} (sha256 {})", font.path().display(), font.sha256());
    println!(
        "Visual keywords: {}",
        manifest.script.visual_keywords().join(", ")
    );
    Ok(())
}

fn open_media(manifest: &Manifest) -> Result<Box<dyn MediaSource>> {
    match &manifest.media.library {
        Some(root) => Ok(Box::new(LocalMediaLibrary::open(root)?)),
        None => Ok(Box::new(NoMedia)),
    }
}

fn compose_plan(
    manifest: &Manifest,
    styles: &StyleTable,
    synthesizer: &mut dyn SpeechSynthesizer,
) -> Result<TimelinePlan> {
    let media = open_media(manifest)?;
    let settings = ComposerSettings::from_manifest(manifest);
    TimelineComposer::new(settings, styles, synthesizer, media.as_ref()).compose(&manifest.script)
}

fn run_plan(manifest_path: &Path, estimate: bool) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let styles = style_table(&manifest)?;
    let work_dir = &manifest.environment.work_dir;

    let plan = if estimate {
        compose_plan(&manifest, &styles, &mut EstimatedSpeech::new(work_dir))?
    } else {
        let mut speech = CommandSynthesizer::new(manifest.voice.clone(), work_dir);
        compose_plan(&manifest, &styles, &mut speech)?
    };

    for phase in &plan.phases {
        let visual = phase
            .cuts
            .first()
            .map(|cut| cut.visual.label())
            .unwrap_or_default();
        println!(
            "{:>8.2}s {:>7.2}s  {:<10} {:<16} captions={:<3} cuts={} {}",
            phase.start,
            phase.duration,
            phase.kind.to_string(),
            phase.id,
            phase.captions.len(),
            phase.cuts.len(),
            visual
        );
    }
    println!(
        "Total: {:.2}s, {} frames, {} caption clips",
        plan.total_duration,
        plan.total_frames(),
        plan.caption_count()
    );
    for marker in plan.chapter_markers() {
        println!("{marker}");
    }
    Ok(())
}

fn run_preview(
    timing_path: &Path,
    text: &str,
    format: &str,
    font_path: Option<&Path>,
    at: f64,
    output_path: &Path,
) -> Result<()> {
    let format = VideoFormat::from_keyword(format)?;
    let font = font_path.map(FontFace::load).transpose()?;
    let glyphs: &dyn GlyphSource = match &font {
        Some(font) => font,
        None => &BoxGlyphs,
    };

    let timing = TimingSource::load(timing_path)?;
    let aligned = align(text, &timing, DEFAULT_MARKER);
    let styled = style_words(&aligned, &StyleTable::default(), None);
    let phrases = chunk_phrases(&styled, format.default_max_words(), TRAILING_BUFFER_SECONDS);
    let phrase = phrases
        .iter()
        .find(|phrase| at < phrase.window_end)
        .or_else(|| phrases.last())
        .ok_or_else(|| anyhow!("timing {} has no words", timing_path.display()))?;

    let layout = layout_phrase(phrase, glyphs, &format.frame(), true);
    let frame = render_caption(&layout, at - phrase.window_start)?;
    frame.save_png(output_path)?;
    println!(
        "Wrote {} ({}x{}, phrase '{}')",
        output_path.display(),
        frame.width(),
        frame.height(),
        phrase.text()
    );
    Ok(())
}

fn run_build(manifest_path: &Path, output_path: &Path) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let styles = style_table(&manifest)?;
    let font = FontFace::load(&manifest.environment.font)?;
    font.warn_unsupported_codepoints(&manifest.script.all_text(), "script");
    let work_dir = manifest.environment.work_dir.clone();

    let mut speech = CommandSynthesizer::new(manifest.voice.clone(), &work_dir);
    let plan = compose_plan(&manifest, &styles, &mut speech)?;

    let soundtrack = work_dir.join("soundtrack.wav");
    build_soundtrack(&plan, &soundtrack)?;

    let mut renderer = Renderer::new(&plan, &font, manifest.environment.background);
    let settings = EncoderSettings::new(
        renderer.width(),
        renderer.height(),
        plan.fps,
        &manifest.encoding,
    )
    .with_audio(&soundtrack);
    if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let ffmpeg = FfmpegPipe::spawn_with_mode(&settings, output_path, manifest.encoding.ffmpeg)?;

    let total_frames = renderer.total_frames();
    let fps = u64::from(plan.fps);
    for frame_index in 0..total_frames {
        let rgba = renderer.render_frame_rgba(frame_index)?;
        ffmpeg.write_frame(rgba)?;

        if frame_index % fps == 0 {
            info!("rendered frame {}/{}", frame_index + 1, total_frames);
        }
    }

    renderer.finish()?;
    ffmpeg.finish()?;

    let markers = plan.chapter_markers();
    if !markers.is_empty() {
        let chapters_path = output_path.with_extension("chapters.txt");
        fs::write(&chapters_path, markers.join("\n") + "\n")
            .with_context(|| format!("failed to write {}", chapters_path.display()))?;
        println!("Chapters: {}", chapters_path.display());
    }
    println!("Wrote {}", output_path.display());
    Ok(())
}
