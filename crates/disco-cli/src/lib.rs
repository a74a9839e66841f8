//! disco-cli : Bibliothèque commune du binaire `disco`.
//!
//! Objectifs : mutualiser I/O, chrono, couleurs, config TOML, chargement des
//! entrées et rendu (listing, JSON, labels, lignes, résumé).
//!
//! ## Modules & zones clés
//! - `prelude` : import rapide des types/fns usuels
//! - I/O       : `read_bytes`, `read_stdin_to_bytes`, `write_text`, `to_utf8`
//! - Time      : `Timer`, `human_millis`
//! - Couleurs  : `ColorMode`, `setup_colors`
//! - Logs      : `init_tracing` (`DISCO_LOG`, `-v`/`-q`)
//! - Config    : `DiscoConfig`, `load_config` (recherche ascendante de `disco.toml`)
//! - Entrées   : `Payload`, `parse_input`
//! - Rendu     : `RenderOptions`, `render`, `summary`
//!
//! Les fonctions renvoient `anyhow::Result` ; le contexte nomme toujours le
//! fichier concerné.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use disco_core::{
    code_info, decode_bytes, disassemble_raw, find_jump_targets, pretty_flags, Bytecode, CodeUnit, DisError,
    DisResult, Instruction, JumpTargets, SideTables,
};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nom du fichier de config cherché en remontant depuis le dossier courant.
pub const CONFIG_FILE: &str = "disco.toml";

/// Variable d'environnement lue par [`init_tracing`].
pub const LOG_ENV: &str = "DISCO_LOG";

/// Petite bannière de version utile pour logs/outils.
pub fn version_banner(tool: &str) -> String {
    format!("{tool} (disco {VERSION})")
}

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Prelude pratique pour le bin : re-exports compacts.
pub mod prelude {
    pub use crate::{
        default_filename_with_ext, human_millis, init_tracing, load_config, parse_input, read_bytes,
        read_stdin_to_bytes, render, setup_colors, summary, to_utf8, version_banner, write_text, ColorMode,
        DiscoConfig, Payload, RenderOptions, Timer,
    };
    pub use anyhow::{anyhow, Context, Result};
    pub use camino::{Utf8Path, Utf8PathBuf};
    pub use std::path::PathBuf;
}

/* ------------------------------------------------------------------------- */
/* I/O utils                                                                 */
/* ------------------------------------------------------------------------- */

/// Lis un fichier binaire.
pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("lecture {path}"))
}

/// Lis tout `stdin` en bytes.
pub fn read_stdin_to_bytes() -> Result<Vec<u8>> {
    let mut v = Vec::new();
    io::stdin().read_to_end(&mut v).context("lecture stdin")?;
    Ok(v)
}

/// Écrit un texte (UTF-8). Crée les dossiers au besoin.
pub fn write_text(path: &Utf8Path, s: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("création {parent}"))?;
    }
    let mut f = fs::File::create(path).with_context(|| format!("création {path}"))?;
    f.write_all(s.as_bytes()).with_context(|| format!("écriture {path}"))?;
    Ok(())
}

/// Convertit un `PathBuf` en `Utf8PathBuf` (erreur si non UTF-8).
pub fn to_utf8(p: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(p).map_err(|p| anyhow!("chemin non UTF-8: {}", p.display()))
}

/// Construit un nom `<stem>.<ext>` à partir d'un input.
pub fn default_filename_with_ext(input: &Utf8Path, ext: &str) -> String {
    let stem = input.file_stem().unwrap_or("out");
    format!("{stem}.{ext}")
}

/* ------------------------------------------------------------------------- */
/* Time / chrono                                                             */
/* ------------------------------------------------------------------------- */

/// Chrono de scope simple; loggable ensuite.
pub struct Timer {
    start: Instant,
}
impl Timer {
    /// Démarre un chrono.
    pub fn start() -> Self { Self { start: Instant::now() } }
    /// Durée écoulée.
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }
    /// Format humain court.
    pub fn pretty(&self) -> String { human_millis(self.elapsed()) }
}

/// Format "humain" d'une durée.
pub fn human_millis(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms} ms");
    }
    let s = d.as_secs_f64();
    if s < 60.0 {
        return format!("{s:.3} s");
    }
    let m = (s / 60.0).floor();
    let rest = s - m * 60.0;
    format!("{m:.0} min {rest:.1} s")
}

/* ------------------------------------------------------------------------- */
/* Couleurs                                                                  */
/* ------------------------------------------------------------------------- */

/// Contrôle l'application de couleurs ANSI dans les sorties CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Active les couleurs seulement si la sortie supporte ANSI (auto-détection).
    #[default]
    Auto,
    /// Force l'activation des couleurs.
    Always,
    /// Désactive complètement les couleurs ANSI.
    Never,
}

/// Configure le mode couleur global pour yansi (si feature `colors` active).
pub fn setup_colors(mode: ColorMode) {
    #[cfg(feature = "colors")]
    {
        match mode {
            ColorMode::Auto => yansi::whenever(yansi::Condition::DEFAULT),
            ColorMode::Always => yansi::enable(),
            ColorMode::Never => yansi::disable(),
        }
    }
    #[cfg(not(feature = "colors"))]
    {
        let _ = mode;
    }
}

#[cfg(feature = "colors")]
fn header(text: &str) -> String {
    use yansi::{Color, Paint};
    text.paint(Color::Cyan).bold().to_string()
}
#[cfg(not(feature = "colors"))]
fn header(text: &str) -> String { text.to_owned() }

#[cfg(feature = "colors")]
fn bullet() -> String {
    use yansi::{Color, Paint};
    "•".paint(Color::Blue).to_string()
}
#[cfg(not(feature = "colors"))]
fn bullet() -> String { "•".to_owned() }

/* ------------------------------------------------------------------------- */
/* Logs                                                                      */
/* ------------------------------------------------------------------------- */

/// Installe le subscriber `tracing` sur stderr.
///
/// `DISCO_LOG` l'emporte ; sinon `-q` → `error`, 0/1/2/3+ `-v` →
/// `warn`/`info`/`debug`/`trace`. Un second appel est sans effet.
pub fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

/* ------------------------------------------------------------------------- */
/* Config                                                                    */
/* ------------------------------------------------------------------------- */

/// Contenu de `disco.toml`. Les flags CLI priment sur ces valeurs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoConfig {
    /// Largeur de la colonne des numéros de ligne (0 la masque).
    #[serde(default = "d_lineno_width")]
    pub lineno_width: usize,
    /// Couleurs par défaut quand `--color` est absent.
    #[serde(default)]
    pub color: Option<ColorMode>,
    /// JSON indenté.
    #[serde(default = "d_true")]
    pub json_pretty: bool,
    /// Préfixe chaque listing par `code_info`.
    #[serde(default)]
    pub show_info: bool,
}
fn d_lineno_width() -> usize { 3 }
fn d_true() -> bool { true }

impl Default for DiscoConfig {
    fn default() -> Self { Self { lineno_width: d_lineno_width(), color: None, json_pretty: true, show_info: false } }
}

fn parse_config(path: &Path) -> Result<DiscoConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("lecture config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("TOML invalide: {}", path.display()))
}

/// Charge `explicit`, sinon le premier `disco.toml` en remontant depuis
/// `start`, sinon `Default`.
pub fn load_config_from(explicit: Option<&Path>, start: &Path) -> Result<DiscoConfig> {
    if let Some(p) = explicit {
        return parse_config(p);
    }
    let mut cur = start.to_path_buf();
    loop {
        let cand = cur.join(CONFIG_FILE);
        if cand.is_file() {
            tracing::debug!(path = %cand.display(), "config trouvée");
            return parse_config(&cand);
        }
        if !cur.pop() {
            break;
        }
    }
    Ok(DiscoConfig::default())
}

/// [`load_config_from`] depuis le dossier courant.
pub fn load_config(explicit: Option<&Path>) -> Result<DiscoConfig> {
    let cwd = std::env::current_dir().context("dossier courant introuvable")?;
    load_config_from(explicit, &cwd)
}

/* ------------------------------------------------------------------------- */
/* Entrées                                                                   */
/* ------------------------------------------------------------------------- */

/// Entrée chargée : unité complète (conteneur) ou buffer brut.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Conteneur DISCO décodé.
    Unit(Arc<CodeUnit>),
    /// Instructions empaquetées sans tables annexes.
    Raw(Vec<u8>),
}

impl Payload {
    /// Buffer d'instructions.
    pub fn code(&self) -> &[u8] {
        match self {
            Payload::Unit(unit) => &unit.code,
            Payload::Raw(code) => code,
        }
    }
}

/// Interprète les octets lus pour `name`.
///
/// Les sources `.py` sont refusées : aucun compilateur n'est embarqué.
pub fn parse_input(name: &Utf8Path, bytes: Vec<u8>, raw: bool) -> Result<Payload> {
    if name.extension() == Some("py") {
        return Err(DisError::unsupported("str")).with_context(|| format!("{name}: aucun compilateur disponible"));
    }
    if raw {
        return Ok(Payload::Raw(bytes));
    }
    let unit = disco_unit::from_bytes(&bytes).with_context(|| format!("conteneur invalide: {name}"))?;
    Ok(Payload::Unit(Arc::new(unit)))
}

/* ------------------------------------------------------------------------- */
/* Rendu                                                                     */
/* ------------------------------------------------------------------------- */

/// Ce que [`render`] produit pour une entrée.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// `code_info` avant le listing.
    pub info: bool,
    /// Enregistrements JSON au lieu du listing.
    pub json: bool,
    /// JSON indenté.
    pub json_pretty: bool,
    /// Section des cibles de saut.
    pub labels: bool,
    /// Section offset → ligne.
    pub lines: bool,
    /// Offset marqué `-->`.
    pub lasti: Option<usize>,
    /// Décalage ajouté aux numéros de ligne.
    pub line_offset: i32,
    /// Largeur de la colonne des lignes.
    pub lineno_width: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            info: false,
            json: false,
            json_pretty: true,
            labels: false,
            lines: false,
            lasti: None,
            line_offset: 0,
            lineno_width: 3,
        }
    }
}

fn to_json<I>(instrs: I, pretty: bool) -> Result<String>
where
    I: IntoIterator<Item = DisResult<Instruction>>,
{
    let records = instrs.into_iter().collect::<DisResult<Vec<_>>>()?;
    let text = if pretty { serde_json::to_string_pretty(&records) } else { serde_json::to_string(&records) };
    text.context("sérialisation JSON")
}

fn write_labels(out: &mut String, targets: &JumpTargets) {
    let list = targets.iter().map(ToString::to_string).collect::<Vec<_>>();
    if list.is_empty() {
        out.push_str("Labels: (none)\n");
    } else {
        let _ = writeln!(out, "Labels: {}", list.join(", "));
    }
}

/// Rend une entrée : `code_info`, listing ou JSON, puis labels et lignes.
pub fn render(payload: &Payload, opts: &RenderOptions) -> Result<String> {
    let mut out = String::new();
    match payload {
        Payload::Unit(unit) => {
            if opts.info {
                out.push_str(&code_info(unit));
                out.push_str("\n\n");
            }
            let mut view = Bytecode::new(Arc::clone(unit))
                .with_line_offset(opts.line_offset)
                .with_lineno_width(opts.lineno_width);
            if let Some(lasti) = opts.lasti {
                view = view.with_current_offset(lasti);
            }
            if opts.json {
                out.push_str(&to_json(&view, opts.json_pretty)?);
                out.push('\n');
            } else {
                out.push_str(&view.display_code()?);
            }
            if opts.lines {
                out.push_str("\nLine starts:\n");
                for (offset, line) in view.line_starts() {
                    let _ = writeln!(out, "{offset:>6} -> {}", line.saturating_add_signed(opts.line_offset));
                }
            }
        }
        Payload::Raw(code) => {
            if opts.info || opts.lines {
                tracing::warn!("buffer brut : pas de métadonnées, --info/--lines ignorés");
            }
            if opts.json {
                out.push_str(&to_json(decode_bytes(code, SideTables::default(), None), opts.json_pretty)?);
                out.push('\n');
            } else {
                out.push_str(&disassemble_raw(code, opts.lasti)?);
            }
        }
    }
    if opts.labels {
        out.push('\n');
        write_labels(&mut out, &find_jump_targets(payload.code())?);
    }
    Ok(out)
}

/// En-tête coloré pour `--summary` (stderr).
pub fn summary(name: &Utf8Path, payload: &Payload) -> Result<String> {
    let count = decode_bytes(payload.code(), SideTables::default(), None).collect::<DisResult<Vec<_>>>()?.len();
    let title = name.file_name().unwrap_or("<stdin>");
    let mut out = String::new();
    let _ = writeln!(out, "{}", header(&format!("== {title} ==")));
    match payload {
        Payload::Unit(unit) => {
            let _ = writeln!(
                out,
                "{} code={}, file={}, line={}, bytes={}, instructions={count}",
                bullet(),
                unit.name,
                unit.filename,
                unit.firstlineno,
                unit.code.len()
            );
            let _ = writeln!(
                out,
                "{} consts={}, names={}, varnames={}, flags={}",
                bullet(),
                unit.consts.len(),
                unit.names.len(),
                unit.varnames.len(),
                pretty_flags(unit.flags)
            );
        }
        Payload::Raw(code) => {
            let _ = writeln!(out, "{} raw, bytes={}, instructions={count}", bullet(), code.len());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_durations() {
        assert_eq!(human_millis(Duration::from_millis(12)), "12 ms");
        assert_eq!(human_millis(Duration::from_millis(1_500)), "1.500 s");
        assert_eq!(human_millis(Duration::from_secs(90)), "1 min 30.0 s");
    }

    #[test]
    fn output_names() {
        assert_eq!(default_filename_with_ext(Utf8Path::new("a/b/f.disco"), "dis.txt"), "f.dis.txt");
        assert_eq!(default_filename_with_ext(Utf8Path::new(""), "json"), "out.json");
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let cfg: DiscoConfig = toml::from_str("color = \"never\"").unwrap();
        assert_eq!(cfg, DiscoConfig { color: Some(ColorMode::Never), ..DiscoConfig::default() });
        assert!(toml::from_str::<DiscoConfig>("colour = 1").is_err());
    }

    #[test]
    fn raw_labels_section() {
        let out = render(&Payload::Raw(vec![113, 0, 0]), &RenderOptions { labels: true, ..RenderOptions::default() })
            .unwrap();
        assert_eq!(out, "    >>    0 JUMP_ABSOLUTE            0 (0)\n\nLabels: 0\n");
    }
}
