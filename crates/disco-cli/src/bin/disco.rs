// crates/disco-cli/src/bin/disco.rs
//! Désassembleur disco pour conteneurs DISCO et buffers bruts.
//!
//! Exemples :
//!   disco f.disco
//!   disco a.disco b.disco --out-dir target/dis/
//!   cat code.bin | disco - --raw --labels
//!   disco f.disco --json | jq
//!
//! Options utiles :
//!   --raw            : entrées = instructions empaquetées sans tables
//!   --info           : préfixe le listing par les métadonnées de l'unité
//!   --json           : enregistrements d'instructions en JSON
//!   --emit <f>       : écrit la sortie dans un fichier (si 1 entrée)
//!   --out-dir <d>    : écrit `<stem>.dis.txt` / `<stem>.dis.json` (si N entrées)
//!   --lasti <n>      : marque l'instruction courante (`-->`)
//!   --line-offset <n>: décale les numéros de ligne
//!   --labels/--lines : cibles de saut / table offset → ligne
//!   --summary        : résumé coloré sur stderr
//!   --time           : chrono par entrée
//!
//! Une entrée en échec est signalée et le lot continue ; code de sortie 1 si
//! au moins une entrée a échoué.

use clap::{ArgAction, Parser};

use disco_cli::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "disco", version, about = "Désassembleur de bytecode CPython 2.x empaqueté (texte/JSON)")]
struct Cli {
    /// Conteneur(s) à désassembler ('-' pour stdin, unique)
    inputs: Vec<String>,

    /// Lit des buffers d'instructions bruts au lieu de conteneurs
    #[arg(long)]
    raw: bool,

    /// Affiche `code_info` avant le listing
    #[arg(long)]
    info: bool,

    /// Sortie JSON (enregistrements d'instructions)
    #[arg(long)]
    json: bool,

    /// Fichier où écrire la sortie (si 1 entrée)
    #[arg(long, conflicts_with = "out_dir")]
    emit: Option<PathBuf>,

    /// Dossier où écrire les sorties (si N entrées)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Offset de l'instruction à marquer `-->`
    #[arg(long)]
    lasti: Option<usize>,

    /// Décalage ajouté à chaque numéro de ligne
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    line_offset: i32,

    /// Affiche les cibles de saut
    #[arg(long)]
    labels: bool,

    /// Affiche la table offset → ligne
    #[arg(long)]
    lines: bool,

    /// Résumé rapide sur stderr
    #[arg(long)]
    summary: bool,

    /// Fichier de config explicite (sinon `disco.toml` en remontant)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Couleurs du résumé : auto|always|never
    #[arg(long, value_enum)]
    color: Option<ColorMode>,

    /// Affiche la durée de traitement
    #[arg(long)]
    time: bool,

    /// Verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Erreurs seulement
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    match real_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ {e:#}");
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` quand au moins une entrée a échoué.
fn real_main() -> Result<bool> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = load_config(cli.config.as_deref())?;
    setup_colors(cli.color.or(cfg.color).unwrap_or_default());
    tracing::debug!(?cfg, "{}", version_banner("disco"));

    if cli.inputs.is_empty() {
        return Err(anyhow!("Aucune entrée. Exemple: disco f.disco"));
    }
    let use_stdin = cli.inputs.iter().any(|i| i == "-");
    if use_stdin && cli.inputs.len() > 1 {
        return Err(anyhow!("'-' (stdin) doit être l'unique entrée"));
    }
    if use_stdin && cli.out_dir.is_some() {
        return Err(anyhow!("--out-dir n'a pas de sens avec stdin; utilise --emit"));
    }
    if cli.inputs.len() > 1 && cli.emit.is_some() {
        return Err(anyhow!("Plusieurs entrées → utilise --out-dir au lieu de --emit"));
    }

    let opts = RenderOptions {
        info: cli.info || cfg.show_info,
        json: cli.json,
        json_pretty: cfg.json_pretty,
        labels: cli.labels,
        lines: cli.lines,
        lasti: cli.lasti,
        line_offset: cli.line_offset,
        lineno_width: cfg.lineno_width,
    };

    let mut failed = 0usize;
    for input in &cli.inputs {
        let timer = Timer::start();
        if let Err(e) = process_one(input, &cli, &opts) {
            failed += 1;
            tracing::debug!(input = %input, "entrée en échec");
            eprintln!("❌ {e:#}");
        }
        if cli.time {
            eprintln!("⏱️  {input}: {}", timer.pretty());
        }
    }

    if failed > 0 {
        tracing::warn!(failed, total = cli.inputs.len(), "des entrées ont échoué");
    }
    Ok(failed == 0)
}

fn process_one(input: &str, cli: &Cli, opts: &RenderOptions) -> Result<()> {
    let (bytes, name) = if input == "-" {
        (read_stdin_to_bytes()?, Utf8PathBuf::from("<stdin>"))
    } else {
        let path = Utf8PathBuf::from(input);
        (read_bytes(&path)?, path)
    };
    tracing::info!(input = %name, bytes = bytes.len(), raw = cli.raw, "désassemblage");

    let payload = parse_input(&name, bytes, cli.raw)?;
    if cli.summary {
        eprint!("{}", summary(&name, &payload)?);
    }
    let text = render(&payload, opts)?;

    if let Some(file) = &cli.emit {
        let out = to_utf8(file.clone())?;
        write_text(&out, &text)?;
        eprintln!("📝 {name} → {out}");
    } else if let Some(dir) = &cli.out_dir {
        let dir = to_utf8(dir.clone())?;
        let ext = if opts.json { "dis.json" } else { "dis.txt" };
        let out = dir.join(default_filename_with_ext(&name, ext));
        write_text(&out, &text)?;
        eprintln!("📝 {name} → {out}");
    } else {
        print!("{text}");
    }
    Ok(())
}
