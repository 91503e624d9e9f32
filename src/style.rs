use std::collections::HashSet;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use serde::{de::Error as DeError, Deserialize, Deserializer};

/// 8-bit straight-alpha color, written in manifests as `#RRGGBB` or
/// `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn parse_hex(value: &str) -> Result<Self> {
        let digits = value
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("color '{value}' must start with '#'"))?;
        if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            bail!("color '{value}' must be #RRGGBB or #RRGGBBAA");
        }

        let channel = |index: usize| -> Result<u8> {
            u8::from_str_radix(&digits[index..index + 2], 16)
                .map_err(|error| anyhow!("color '{value}': {error}"))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if digits.len() == 8 { channel(6)? } else { 255 },
        })
    }
}

impl fmt::Display for Rgba8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl<'de> Deserialize<'de> for Rgba8 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Self::parse_hex(&source).map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColorCategory {
    Default,
    Emphasis,
    Numeric,
    Semantic(String),
}

impl fmt::Display for ColorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Emphasis => f.write_str("emphasis"),
            Self::Numeric => f.write_str("numeric"),
            Self::Semantic(name) => write!(f, "semantic({name})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleDescriptor {
    pub category: ColorCategory,
    pub fill: Rgba8,
    pub size_multiplier: f32,
    pub stroke: Rgba8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemanticSet {
    pub name: String,
    pub color: Rgba8,
    pub keywords: Vec<String>,
}

/// Optional overrides read from the manifest `style:` block. Anything left
/// out keeps the built-in value; `semantic_sets` replaces the whole list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleConfig {
    #[serde(default)]
    pub default_fill: Option<Rgba8>,
    #[serde(default)]
    pub emphasis_fill: Option<Rgba8>,
    #[serde(default)]
    pub numeric_fill: Option<Rgba8>,
    #[serde(default)]
    pub stroke: Option<Rgba8>,
    #[serde(default)]
    pub keyword_multiplier: Option<f32>,
    #[serde(default)]
    pub override_multiplier: Option<f32>,
    #[serde(default)]
    pub semantic_sets: Option<Vec<SemanticSet>>,
}

/// Immutable word-to-style rules. Built once and shared by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    default_fill: Rgba8,
    emphasis_fill: Rgba8,
    numeric_fill: Rgba8,
    stroke: Rgba8,
    keyword_multiplier: f32,
    override_multiplier: f32,
    semantic_sets: Vec<SemanticSet>,
}

pub const KEYWORD_SIZE_MULTIPLIER: f32 = 1.5;
pub const OVERRIDE_SIZE_MULTIPLIER: f32 = 1.3;

const GOLD: Rgba8 = Rgba8::rgb(0xFF, 0xD7, 0x00);
const MAGENTA: Rgba8 = Rgba8::rgb(0xFF, 0x00, 0xFF);

const LEGEND_KEYWORDS: &[&str] = &[
    "messi", "ronaldo", "best", "pele", "maradona", "zidane", "cruyff", "puskas", "platini",
    "gullit", "rijkaard", "maldini", "baresi", "buffon", "neuer", "yashin", "banks", "moore",
    "beckenbauer", "matthaus", "xavi", "iniesta", "pirlo", "modric", "kroos", "busquets",
    "casemiro", "kante", "makelele", "vieira", "keane", "scholes", "gerrard", "lampard", "henry",
    "ronaldinho", "rivaldo", "kaka", "neymar", "suarez", "lewandowski", "benzema", "mbappe",
    "haaland", "kane", "salah", "mane", "firmino", "debruyne", "aguero", "rooney", "cantona",
    "beckham", "giggs", "ferguson", "wenger", "mourinho", "guardiola", "klopp", "ancelotti",
    "flick", "tuchel", "nagelsmann", "arteta", "conte", "allegri", "simerine", "zoff",
    "facchetti", "scirea", "gento", "kopa", "fontaine", "eusebio", "charlton", "law", "greaves",
    "rush", "dalglish", "hansen", "souness", "keegan", "robson", "lineker", "shearer",
    "gascoigne", "owen", "fowler", "mcmanaman", "cole", "yorke", "sheringham", "solskjaer",
    "schmeichel", "evra", "vidic", "ferdinand", "neville", "carrick", "park", "tevez",
    "berbatov", "nani", "valencia", "young", "mata", "ibrahimovic", "zlatan", "etoo", "drogba",
    "terry", "cech", "ivanovic", "carvalho", "essien", "ballack", "deco", "shevchenko", "torres",
    "villa", "silva", "company", "toure", "hart", "zabaleta", "kolarov", "nasri", "dzeko",
    "balotelli", "sterling", "sane", "mahrez", "bernardo", "foden", "grealish", "stones", "dias",
    "walker", "cancelo", "ederson", "alisson", "matip", "konate", "gomez", "robertson", "arnold",
    "fabinho", "henderson", "thiago", "wijnaldum", "milner", "keitaby", "jones", "elliott",
    "nunez", "gapko", "diaz", "jota", "origi", "minamino", "shaqiri", "oxlade-chamberlain",
    "lallana", "lovren", "klavan", "mignolet", "karius", "adrian", "legend", "king", "goat",
    "god", "boss", "manager", "coach", "captain", "star", "hero", "idol", "icon", "genius",
];

const HISTORY_KEYWORDS: &[&str] = &[
    "year", "date", "time", "history", "record", "world", "cup", "euro", "ucl", "champions",
    "league",
];

const ACTION_KEYWORDS: &[&str] = &[
    "attack", "hit", "kill", "destroy", "goal", "score", "fight", "punch", "red", "card", "foul",
    "injury", "blood", "fire", "danger", "shock", "death", "mad", "crazy", "beast", "monster",
    "fail", "miss", "bad", "stop", "urgent", "important", "alert", "lose", "defeat", "error",
    "mistake",
];

const POSITIVE_KEYWORDS: &[&str] = &[
    "win", "success", "pass", "safe", "money", "grass", "pitch", "start", "go", "good", "best",
    "great", "amazing", "approve", "grow", "nature", "victory", "trophy", "title", "cup",
    "champion", "winner",
];

const CAUTION_KEYWORDS: &[&str] = &[
    "yellow", "caution", "warning", "attention", "happy", "smile", "fun", "highlight", "optimism",
    "wait", "slow", "pause",
];

const CALM_KEYWORDS: &[&str] = &[
    "blue", "calm", "cool", "sky", "sad", "cry", "tears", "cold", "ice", "trust", "stable",
    "security", "chelsea", "city",
];

fn builtin_set(name: &str, color: Rgba8, keywords: &[&str]) -> SemanticSet {
    SemanticSet {
        name: name.to_owned(),
        color,
        keywords: keywords.iter().map(|keyword| (*keyword).to_owned()).collect(),
    }
}

impl Default for StyleTable {
    fn default() -> Self {
        Self {
            default_fill: Rgba8::WHITE,
            emphasis_fill: GOLD,
            numeric_fill: MAGENTA,
            stroke: Rgba8::BLACK,
            keyword_multiplier: KEYWORD_SIZE_MULTIPLIER,
            override_multiplier: OVERRIDE_SIZE_MULTIPLIER,
            semantic_sets: vec![
                builtin_set("legend", GOLD, LEGEND_KEYWORDS),
                builtin_set("history", MAGENTA, HISTORY_KEYWORDS),
                builtin_set("action", Rgba8::rgb(0xFF, 0x00, 0x4D), ACTION_KEYWORDS),
                builtin_set("positive", Rgba8::rgb(0x00, 0xFF, 0x66), POSITIVE_KEYWORDS),
                builtin_set("caution", Rgba8::rgb(0xFF, 0xFF, 0x00), CAUTION_KEYWORDS),
                builtin_set("calm", Rgba8::rgb(0x00, 0xCC, 0xFF), CALM_KEYWORDS),
            ],
        }
    }
}

impl StyleTable {
    pub fn from_config(config: &StyleConfig) -> Result<Self> {
        let builtin = Self::default();
        let table = Self {
            default_fill: config.default_fill.unwrap_or(builtin.default_fill),
            emphasis_fill: config.emphasis_fill.unwrap_or(builtin.emphasis_fill),
            numeric_fill: config.numeric_fill.unwrap_or(builtin.numeric_fill),
            stroke: config.stroke.unwrap_or(builtin.stroke),
            keyword_multiplier: config
                .keyword_multiplier
                .unwrap_or(builtin.keyword_multiplier),
            override_multiplier: config
                .override_multiplier
                .unwrap_or(builtin.override_multiplier),
            semantic_sets: match &config.semantic_sets {
                Some(sets) => sets
                    .iter()
                    .map(|set| SemanticSet {
                        name: set.name.trim().to_owned(),
                        color: set.color,
                        keywords: set
                            .keywords
                            .iter()
                            .map(|keyword| keyword.trim().to_lowercase())
                            .collect(),
                    })
                    .collect(),
                None => builtin.semantic_sets,
            },
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("keyword_multiplier", self.keyword_multiplier),
            ("override_multiplier", self.override_multiplier),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("style.{label} must be finite and > 0, got {value}");
            }
        }

        let mut seen = HashSet::with_capacity(self.semantic_sets.len());
        for set in &self.semantic_sets {
            if set.name.is_empty() {
                bail!("style semantic set names cannot be empty");
            }
            if !seen.insert(set.name.as_str()) {
                bail!("duplicate style semantic set '{}'", set.name);
            }
        }
        Ok(())
    }

    pub fn semantic_sets(&self) -> &[SemanticSet] {
        &self.semantic_sets
    }

    pub fn semantic_color(&self, name: &str) -> Option<Rgba8> {
        self.semantic_sets
            .iter()
            .find(|set| set.name == name)
            .map(|set| set.color)
    }

    pub fn stroke(&self) -> Rgba8 {
        self.stroke
    }

    pub fn default_fill(&self) -> Rgba8 {
        self.default_fill
    }

    /// Digits win over emphasis, emphasis wins over keyword sets, and keyword
    /// sets are tried in declaration order.
    pub fn classify(&self, text: &str, emphasized: bool) -> StyleDescriptor {
        if text.chars().any(|ch| ch.is_ascii_digit()) {
            return self.descriptor(ColorCategory::Numeric, self.numeric_fill);
        }
        if emphasized {
            return self.descriptor(ColorCategory::Emphasis, self.emphasis_fill);
        }

        let key = text
            .trim_matches(|ch: char| !ch.is_alphanumeric())
            .to_lowercase();
        if !key.is_empty() {
            if let Some(set) = self
                .semantic_sets
                .iter()
                .find(|set| set.keywords.iter().any(|keyword| *keyword == key))
            {
                return self.descriptor(ColorCategory::Semantic(set.name.clone()), set.color);
            }
        }

        self.descriptor(ColorCategory::Default, self.default_fill)
    }

    /// Force a named set's color on a word, as hook captions do. Unknown set
    /// names fall back to the regular rules.
    pub fn classify_with_override(
        &self,
        text: &str,
        emphasized: bool,
        set_name: &str,
    ) -> StyleDescriptor {
        match self.semantic_color(set_name) {
            Some(color) => StyleDescriptor {
                category: ColorCategory::Semantic(set_name.to_owned()),
                fill: color,
                size_multiplier: self.override_multiplier,
                stroke: self.stroke,
            },
            None => self.classify(text, emphasized),
        }
    }

    fn descriptor(&self, category: ColorCategory, fill: Rgba8) -> StyleDescriptor {
        let size_multiplier = if category == ColorCategory::Default {
            1.0
        } else {
            self.keyword_multiplier
        };
        StyleDescriptor {
            category,
            fill,
            size_multiplier,
            stroke: self.stroke,
        }
    }
}
