use clap::{Args, Parser, Subcommand};
use log::debug;
use permute_layers::document::{self, MetadataStore, PERM_FORMAT_KEY};
use permute_layers::host::RasterHost;
use permute_layers::permute::{self, RunOptions};
use permute_layers::{config, output};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "permute-layers")]
#[command(about = "Export every combination of layer groups as flattened images")]
#[command(long_about = "\
Export every combination of layer groups as flattened images

A layer document is a JSON file describing a layered image. Group names
carry tags that control how combinations are formed:

  Expression (prm)             # children are alternatives: pick one
  ├── Smile
  ├── Frown
  └── Mouth (prm) (hasbg)      # nested alternatives, combined slot by slot
  Outfit                       # untagged: children are stacked together
  ├── Jacket
  └── Shirt

Filename templates use positional placeholders, one per top-level slot:
  {0}  {1.name}  {0.opacity}  {1.mode}

Naming templates are attached to groups with 'permute-layers template set'
and may also use {layer.name} and {counter}.

Run 'permute-layers gen-config' to generate a documented permute.toml.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Overrides for values read from `permute.toml`.
#[derive(Args, Clone)]
struct ExpansionArgs {
    /// Expand (prm) groups into all of their alternatives
    #[arg(long, conflicts_with = "no_expand_subgroups")]
    expand_subgroups: bool,

    /// Use each top-level group's children as its alternatives
    #[arg(long)]
    no_expand_subgroups: bool,
}

impl ExpansionArgs {
    fn resolve(&self, configured: bool) -> bool {
        if self.expand_subgroups {
            true
        } else if self.no_expand_subgroups {
            false
        } else {
            configured
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Export every combination of the document's layer groups
    Run {
        /// Layer document (JSON)
        document: PathBuf,

        /// Output directory (default: export.output_dir from permute.toml)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Filename template, e.g. "{0.name}/{1.name}.png"
        #[arg(long, short)]
        format: Option<String>,

        #[command(flatten)]
        expansion: ExpansionArgs,
    },
    /// Show or edit the naming templates attached to groups
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },
    /// Print the layer tree and how many files a run would write
    Check {
        /// Layer document (JSON)
        document: PathBuf,

        #[command(flatten)]
        expansion: ExpansionArgs,
    },
    /// Print a stock permute.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List every group with its naming template
    List { document: PathBuf },
    /// Print the naming template of one group
    Get {
        document: PathBuf,
        /// Slash-separated group path, e.g. "Body/Eyes (prm)"
        group: String,
    },
    /// Attach a naming template to a group (an empty template clears it)
    Set {
        document: PathBuf,
        group: String,
        template: String,
    },
    /// Remove a group's naming template
    Clear { document: PathBuf, group: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            document: document_path,
            output: output_dir,
            format,
            expansion,
        } => {
            let dir = document_dir(&document_path);
            let mut settings = config::load_config(&dir)?;
            if let Some(format) = format {
                settings.export.filename_template = format;
            }
            settings.export.expand_subgroups =
                expansion.resolve(settings.export.expand_subgroups);
            settings.validate()?;

            let tree = document::load_document(&document_path)?.to_tree(&dir)?;
            let export_dir = output_dir.unwrap_or_else(|| settings.output_dir(&dir));
            debug!("exporting into {}", export_dir.display());

            let host = RasterHost::new(tree, settings.export.params);
            let options = RunOptions {
                export_dir: export_dir.clone(),
                filename_template: settings.export.filename_template,
                expand_subgroups: settings.export.expand_subgroups,
            };
            let report = permute::run(&host, host.tree(), &options)?;
            for message in host.notifications() {
                println!("{}", message);
            }
            output::print_run_output(&report, &export_dir);
        }
        Command::Template { action } => match action {
            TemplateCommand::List { document: path } => {
                let doc = document::load_document(&path)?;
                output::print_template_list(&doc.groups());
            }
            TemplateCommand::Get {
                document: path,
                group,
            } => {
                let doc = document::load_document(&path)?;
                if let Some(template) = doc.read_metadata(&group, PERM_FORMAT_KEY)? {
                    println!("{}", permute_layers::template::strip_sentinel(&template));
                }
            }
            TemplateCommand::Set {
                document: path,
                group,
                template,
            } => {
                let mut doc = document::load_document(&path)?;
                if template.is_empty() {
                    doc.clear_metadata(&group, PERM_FORMAT_KEY)?;
                } else {
                    doc.write_metadata(&group, PERM_FORMAT_KEY, &template)?;
                }
                document::save_document(&doc, &path)?;
            }
            TemplateCommand::Clear {
                document: path,
                group,
            } => {
                let mut doc = document::load_document(&path)?;
                doc.clear_metadata(&group, PERM_FORMAT_KEY)?;
                document::save_document(&doc, &path)?;
            }
        },
        Command::Check {
            document: document_path,
            expansion,
        } => {
            let dir = document_dir(&document_path);
            let settings = config::load_config(&dir)?;
            let tree = document::load_document(&document_path)?.to_tree(&dir)?;
            println!("==> Checking {}", document_path.display());
            output::print_check_output(&tree, expansion.resolve(settings.export.expand_subgroups));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Directory holding the document; relative image paths and `permute.toml`
/// are resolved against it.
fn document_dir(document: &Path) -> PathBuf {
    match document.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
