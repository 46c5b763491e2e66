use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use vrcosc::{ChatboxMessage, InputAxis, InputButton, OscConfig, OscTransport, OscValue};

#[derive(Parser, Debug, Clone)]
#[command(name = "vrcosc-demo")]
#[command(author, version, about = "Talks to VRChat over OSC: sends a few samples, then prints what comes back")]
struct Args {
    /// JSON config file; VRCOSC_* env vars and the flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to send to
    #[arg(long)]
    remote_host: Option<String>,

    /// Port to send to (VRChat listens on 9000)
    #[arg(long)]
    remote_port: Option<u16>,

    /// Address to listen on
    #[arg(long)]
    listen_host: Option<IpAddr>,

    /// Port to listen on (VRChat sends to 9001)
    #[arg(long)]
    listen_port: Option<u16>,

    /// Receive buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Only listen; skip the sample sends.
    #[arg(long, default_value_t = false)]
    listen_only: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("vrcosc=info".parse().unwrap_or_default())
        .add_directive("vrcosc_demo=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {e}");
    }
}

fn load_config(args: &Args) -> anyhow::Result<OscConfig> {
    let base = match &args.config {
        Some(path) => OscConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OscConfig::default(),
    };
    let mut cfg = base.with_overrides(|key| std::env::var(key).ok())?;

    if let Some(host) = &args.remote_host {
        cfg.remote_host = host.clone();
    }
    if let Some(port) = args.remote_port {
        cfg.remote_port = port;
    }
    if let Some(host) = args.listen_host {
        cfg.listen_host = host;
    }
    if let Some(port) = args.listen_port {
        cfg.listen_port = port;
    }
    if let Some(size) = args.buffer_size {
        cfg.buffer_size = size;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn send_samples(osc: &OscTransport) -> anyhow::Result<()> {
    osc.send_to("/test/lib/float", vec![OscValue::Float(0.5)])?;

    osc.send_parameter("GlassesToggle", true)?;
    osc.send_parameter("GlassesColor", 0.5f32)?;

    osc.send_input(InputAxis::Vertical, 1.0)?;
    osc.send_input(InputButton::Jump, true)?;
    osc.send_input(InputButton::Jump, false)?;
    osc.send_input(InputAxis::Vertical, 0.0)?;

    osc.send_chatbox("Hello World 1", true, false)?;
    osc.send_chatbox_message(&ChatboxMessage::new("Hello World 2").bypass_keyboard(true).play_sfx(true))?;
    osc.send_chatbox_typing(false)?;
    Ok(())
}

async fn send_samples_async(osc: &OscTransport) -> anyhow::Result<()> {
    osc.send_to_async("/test/lib/async/float", vec![OscValue::Float(0.5)]).await?;
    osc.send_parameter_async("GlassesToggle", false).await?;
    osc.send_input_async(InputButton::Jump, true).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    osc.send_input_async(InputButton::Jump, false).await?;
    osc.send_chatbox_async("Hello World 3", true, true).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_config(&args)?;
    info!(
        "vrcosc-demo starting. send={}:{} listen={}:{}",
        cfg.remote_host, cfg.remote_port, cfg.listen_host, cfg.listen_port
    );

    let osc = OscTransport::new();

    osc.subscribe(|msg| msg.print());
    osc.try_add_method("helloworld", |msg| {
        info!("helloworld => {:?}", msg.value());
    });

    let local = osc.listen(cfg.listen_options()).await?;
    info!("Listening on {}", local);

    let (host, port) = cfg.remote_endpoint();
    let remote = osc.connect_to(host, port)?;
    info!("OSC Initialized. sending to {}, receiving on {}", remote, local);
    if !args.listen_only {
        send_samples(&osc)?;
        if let Err(e) = send_samples_async(&osc).await {
            error!("Async sends failed: {:?}", e);
        }
    }

    info!("Press Ctrl-C to exit.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {:?}", e);
    }
    info!("Ctrl-C detected; closing OSC transport...");
    osc.close().await;
    Ok(())
}
