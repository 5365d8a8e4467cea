use clap::{Parser, Subcommand};
use reqwest::header::REFERER;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "retarget-cli")]
#[command(about = "Management CLI for the retarget proxy", long_about = None)]
struct Cli {
    /// Base URL of the running proxy.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current mode and target
    Status,
    /// Set the target base URL (prefixed mode)
    SetUrl {
        /// Absolute URL, e.g. https://api.example.com
        target: String,
    },
    /// Update the target record (direct mode). Omitted fields keep their value.
    SetTarget {
        #[arg(long)]
        target_host: Option<String>,
        #[arg(long)]
        host_header: Option<String>,
        #[arg(long)]
        origin_header: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        allow_origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    // Redirects are the proxy's answer, not something to follow.
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{base}/config")).send().await?;
            print_json(res).await?;
        }
        Commands::SetUrl { target } => {
            let res = client
                .get(format!("{base}/"))
                .query(&[("setUrl", target.as_str())])
                .send()
                .await?;
            if res.status().is_success() {
                println!("Target set to {target}");
            } else {
                eprintln!("Error: proxy rejected the URL (status {})", res.status());
            }
        }
        Commands::SetTarget {
            target_host,
            host_header,
            origin_header,
            user_agent,
            allow_origin,
        } => {
            let form: Vec<(&str, String)> = [
                ("targetHost", target_host),
                ("hostHeader", host_header),
                ("originHeader", origin_header),
                ("userAgent", user_agent),
                ("accessControlAllowOrigin", allow_origin),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect();

            let res = client
                .post(format!("{base}/config"))
                .header(REFERER, format!("{base}/config"))
                .form(&form)
                .send()
                .await?;
            if res.status().is_redirection() {
                let res = client.get(format!("{base}/config")).send().await?;
                print_json(res).await?;
            } else {
                eprintln!("Error: proxy returned status {}", res.status());
                if let Ok(text) = res.text().await {
                    eprintln!("Response: {}", text);
                }
            }
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
