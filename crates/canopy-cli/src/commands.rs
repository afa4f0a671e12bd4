use std::sync::Arc;

use canopy_client::{Client, ClientConfig};
use canopy_server::{Server, ServerConfig, TlsConfig};
use canopy_store::{Contents, Repo, RepoOptions, Slice};
use canopy_types::{CommitInfo, Path};
use colored::Colorize;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(cli.uri, args).await,
        Command::Ping => cmd_ping(&cli.uri, cli.tls).await,
        Command::Get(args) => cmd_get(&cli.uri, cli.tls, args).await,
        Command::Set(args) => cmd_set(&cli.uri, cli.tls, args).await,
        Command::Remove(args) => cmd_remove(&cli.uri, cli.tls, args).await,
        Command::Branches => cmd_branches(&cli.uri, cli.tls).await,
        Command::Head(args) => cmd_head(&cli.uri, cli.tls, args).await,
        Command::Export(args) => cmd_export(&cli.uri, cli.tls, args).await,
        Command::Import(args) => cmd_import(&cli.uri, cli.tls, args).await,
    }
}

async fn connect(uri: &str, tls: bool) -> anyhow::Result<Client> {
    Ok(Client::connect(ClientConfig {
        uri: uri.to_string(),
        tls,
    })
    .await?)
}

async fn on_branch(client: &Client, branch: &Option<String>) -> anyhow::Result<()> {
    if let Some(branch) = branch {
        client.set_current_branch(branch).await?;
    }
    Ok(())
}

async fn cmd_serve(uri: String, args: ServeArgs) -> anyhow::Result<()> {
    let config = ServerConfig {
        uri,
        tls: args.cert.zip(args.key).map(|(cert_path, key_path)| TlsConfig {
            cert_path,
            key_path,
        }),
        with_lower_layer: args.with_lower_layer,
        graphql_port: args.graphql_port,
    };
    let repo = Arc::new(Repo::open(RepoOptions {
        default_branch: args.default_branch,
        with_lower_layer: args.with_lower_layer,
    }));
    let bound = Server::new(config, repo).bind().await?;
    bound.serve().await?;
    Ok(())
}

async fn cmd_ping(uri: &str, tls: bool) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    client.ping().await?;
    println!("{} {}", "✓".green().bold(), uri.bold());
    Ok(())
}

async fn cmd_get(uri: &str, tls: bool, args: GetArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    on_branch(&client, &args.branch).await?;
    match client.find(&Path::parse(&args.path)?).await? {
        Some(contents) => println!("{}", String::from_utf8_lossy(contents.as_bytes())),
        None => anyhow::bail!("no contents at {:?}", args.path),
    }
    Ok(())
}

async fn cmd_set(uri: &str, tls: bool, args: SetArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    on_branch(&client, &args.branch).await?;
    let info = CommitInfo::new(args.author, args.message);
    let commit = client
        .set(
            &Path::parse(&args.path)?,
            &info,
            &Contents::new(args.value.into_bytes()),
        )
        .await?;
    println!("{} {} {}", "✓".green().bold(), args.path.bold(), commit.abbrev().yellow());
    Ok(())
}

async fn cmd_remove(uri: &str, tls: bool, args: RemoveArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    on_branch(&client, &args.branch).await?;
    let info = CommitInfo::new(args.author, args.message);
    let commit = client.remove(&Path::parse(&args.path)?, &info).await?;
    println!("{} {} {}", "✓".green().bold(), args.path.bold(), commit.abbrev().yellow());
    Ok(())
}

async fn cmd_branches(uri: &str, tls: bool) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    let current = client.get_current_branch().await?;
    for branch in client.branches().await? {
        if branch == current {
            println!("{} {}", "*".green(), branch.green().bold());
        } else {
            println!("  {branch}");
        }
    }
    Ok(())
}

async fn cmd_head(uri: &str, tls: bool, args: HeadArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    match client.head(args.branch.as_deref()).await? {
        Some(commit) => println!("{commit}"),
        None => anyhow::bail!("branch has no head"),
    }
    Ok(())
}

async fn cmd_export(uri: &str, tls: bool, args: ExportArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    let slice = client.export(args.depth).await?;
    std::fs::write(&args.output, bincode::serialize(&slice)?)?;
    println!(
        "{} exported {} objects to {}",
        "✓".green().bold(),
        slice.len().to_string().bold(),
        args.output.display()
    );
    Ok(())
}

async fn cmd_import(uri: &str, tls: bool, args: ImportArgs) -> anyhow::Result<()> {
    let client = connect(uri, tls).await?;
    let slice: Slice = bincode::deserialize(&std::fs::read(&args.input)?)?;
    let count = client.import(&slice).await?;
    println!(
        "{} imported {} objects from {}",
        "✓".green().bold(),
        count.to_string().bold(),
        args.input.display()
    );
    Ok(())
}
