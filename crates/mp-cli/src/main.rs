mod cmd;
mod output;
mod tools;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mp",
    about = "Monkeypuzzle — piece-based development workflow over git worktrees",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit progress messages as JSON (results are always JSON on stdout)
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize monkeypuzzle in the current project
    Init {
        /// Project name (default: current directory name)
        #[arg(long)]
        name: Option<String>,

        /// Issue provider
        #[arg(long, default_value = "markdown")]
        issue_provider: String,

        /// PR provider
        #[arg(long, default_value = "github")]
        pr_provider: String,
    },

    /// Show piece status or manage pieces
    Piece {
        #[command(subcommand)]
        subcommand: Option<PieceSubcommand>,
    },

    /// Create and manage issues
    Issue {
        #[command(subcommand)]
        subcommand: IssueSubcommand,
    },

    /// Serve engine operations over JSON-RPC on stdio (MCP)
    Mcp,
}

#[derive(Subcommand)]
enum PieceSubcommand {
    /// Create a new puzzle piece (worktree + tmux session)
    New {
        /// Optional piece name (default: auto-generated)
        #[arg(long)]
        name: Option<String>,

        /// Create the piece from an issue file (e.g. issues/foo.md)
        #[arg(long)]
        issue: Option<String>,
    },

    /// Merge the main branch into the current piece
    Update {
        #[arg(long, default_value = "main")]
        main_branch: String,
    },

    /// Squash-merge the current piece back into the main branch
    Merge {
        #[arg(long, default_value = "main")]
        main_branch: String,
    },

    /// Remove pieces whose branches are already merged
    Cleanup {
        /// Report candidates without removing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts
        #[arg(long)]
        force: bool,

        #[arg(long, default_value = "main")]
        main_branch: String,
    },

    /// Attach to a piece's tmux session
    Attach {
        /// Piece name (default: the current piece)
        name: Option<String>,
    },

    /// Manage pull requests for pieces
    Pr {
        #[command(subcommand)]
        subcommand: PrSubcommand,
    },
}

#[derive(Subcommand)]
enum PrSubcommand {
    /// Push the branch and create a pull request for the current piece
    Create {
        /// PR title (default: issue title or piece name)
        #[arg(long)]
        title: Option<String>,

        /// PR description
        #[arg(long)]
        body: Option<String>,

        /// Base branch to merge into
        #[arg(long, default_value = "main")]
        base: String,
    },
}

#[derive(Subcommand)]
enum IssueSubcommand {
    /// Create a new markdown issue
    Create {
        /// Issue title
        #[arg(long)]
        title: Option<String>,

        /// Issue description
        #[arg(long)]
        description: Option<String>,

        /// Print the expected JSON input and exit
        #[arg(long)]
        schema: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    let json = cli.json;
    if let Err(err) = run(cli) {
        if json {
            let _ = output::print_json(&serde_json::json!({
                "type": "error",
                "message": format!("{err:#}"),
            }));
        } else {
            eprintln!("✗ {err:#}");
        }
        std::process::exit(1);
    }
}

fn init_tracing(command: &Commands) {
    let default_level = match command {
        Commands::Mcp => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init {
            name,
            issue_provider,
            pr_provider,
        } => cmd::init::run(cli.json, name, issue_provider, pr_provider),

        Commands::Piece { subcommand } => match subcommand {
            None => cmd::piece::status(cli.json),
            Some(PieceSubcommand::New { name, issue }) => cmd::piece::new(cli.json, name, issue),
            Some(PieceSubcommand::Update { main_branch }) => {
                cmd::piece::update(cli.json, &main_branch)
            }
            Some(PieceSubcommand::Merge { main_branch }) => {
                cmd::piece::merge(cli.json, &main_branch)
            }
            Some(PieceSubcommand::Cleanup {
                dry_run,
                force,
                main_branch,
            }) => cmd::piece::cleanup(cli.json, dry_run, force, main_branch),
            Some(PieceSubcommand::Attach { name }) => cmd::piece::attach(cli.json, name),
            Some(PieceSubcommand::Pr { subcommand }) => match subcommand {
                PrSubcommand::Create { title, body, base } => {
                    cmd::pr::create(cli.json, title, body, base)
                }
            },
        },

        Commands::Issue { subcommand } => match subcommand {
            IssueSubcommand::Create {
                title,
                description,
                schema,
            } => cmd::issue::create(cli.json, title, description, schema),
        },

        Commands::Mcp => cmd::mcp::run(),
    }
}
