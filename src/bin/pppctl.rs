//! PPP negotiation CLI.
//!
//! # Commands
//!
//! - `negotiate` - Run LCP and IPCP between two in-process links
//! - `config` - Print the effective configuration as TOML

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ppp::{
    link::{Frame, LinkStatus, SharedLink},
    wire::protocol_number,
    Config, ControlMessage, FsmState, LinkEvent, LinkId, LinkRegistry, OptionId, RequesterId,
    VERSION,
};
use tokio::sync::mpsc;

/// Rounds of packet exchange before giving up
const MAX_ROUNDS: usize = 256;

#[derive(Parser)]
#[command(name = "pppctl")]
#[command(version = VERSION)]
#[command(about = "PPP control protocol negotiation", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/ppp/ppp.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate between two in-process links over a loopback channel
    Negotiate {
        /// Our address on the first link
        #[arg(long, default_value = "10.0.0.1")]
        local: Ipv4Addr,

        /// Address the first link assigns to its peer
        #[arg(long, default_value = "10.0.0.2")]
        remote: Ipv4Addr,

        /// Address the second link asks for itself
        #[arg(long)]
        peer_local: Option<Ipv4Addr>,

        /// Ask for Van Jacobson compression on both links
        #[arg(long)]
        vj: bool,

        /// MRU the first link asks for
        #[arg(long)]
        mru: Option<u32>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Negotiate {
            local,
            remote,
            peer_local,
            vj,
            mru,
            json,
        } => {
            init_logging(&config);
            let setup = Setup {
                local,
                remote,
                peer_local,
                vj,
                mru,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cmd_negotiate(config, setup, json))
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let env = Config::from_env();
    let file = match path {
        Some(path) => Some(Config::from_file(path)?),
        None => Config::default_path()
            .filter(|p| p.exists())
            .map(Config::from_file)
            .transpose()?,
    };
    Ok(match file {
        Some(file) => file.merge(env),
        None => env,
    })
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

struct Setup {
    local: Ipv4Addr,
    remote: Ipv4Addr,
    peer_local: Option<Ipv4Addr>,
    vj: bool,
    mru: Option<u32>,
}

impl Setup {
    /// Option commands for both links
    fn commands(&self, a: LinkId, b: LinkId) -> Vec<ControlMessage> {
        let ra = RequesterId(1);
        let rb = RequesterId(2);
        let mut cmds = vec![
            ControlMessage::numeric(
                a,
                ra,
                OptionId::IpcpLocalAddr.as_raw(),
                u32::from(self.local),
            ),
            ControlMessage::numeric(
                a,
                ra,
                OptionId::IpcpRemoteAddr.as_raw(),
                u32::from(self.remote),
            ),
        ];

        if let Some(peer_local) = self.peer_local {
            cmds.push(ControlMessage::numeric(
                b,
                rb,
                OptionId::IpcpLocalAddr.as_raw(),
                u32::from(peer_local),
            ));
        }
        if let Some(mru) = self.mru {
            cmds.push(ControlMessage::numeric(a, ra, OptionId::LcpMru.as_raw(), mru));
        }
        if self.vj {
            for (link, requester) in [(a, ra), (b, rb)] {
                cmds.push(ControlMessage::numeric(
                    link,
                    requester,
                    OptionId::IpcpHdrComp.as_raw(),
                    1,
                ));
            }
        }
        cmds
    }
}

async fn cmd_negotiate(config: Config, setup: Setup, json: bool) -> anyhow::Result<()> {
    let restart = config.fsm.restart_interval();
    let registry = LinkRegistry::new(config);
    let (id_a, id_b) = (LinkId(1), LinkId(2));

    let (tx_a, mut rx_a) = mpsc::unbounded_channel::<Frame>();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel::<Frame>();
    let a = registry.add_link(id_a, Box::new(tx_a)).await;
    let b = registry.add_link(id_b, Box::new(tx_b)).await;

    for cmd in setup.commands(id_a, id_b) {
        let reply = registry.handle(&cmd).await;
        if !reply.is_ok() {
            anyhow::bail!("option {} refused with result {}", cmd.option, reply.result);
        }
    }

    a.lock().await.connect(Some(RequesterId(1)));
    b.lock().await.connect(Some(RequesterId(2)));
    a.lock().await.lower_up();
    b.lock().await.lower_up();

    let mut failures = Vec::new();
    for _ in 0..MAX_ROUNDS {
        let mut moved = deliver(&mut rx_a, &b).await;
        moved += deliver(&mut rx_b, &a).await;

        for (id, link) in [(id_a, &a), (id_b, &b)] {
            for event in link.lock().await.take_events() {
                tracing::debug!(link = %id, ?event, "link event");
                if let LinkEvent::Failed(protocol, reason) = event {
                    failures.push(format!(
                        "{id}: {} failed: {reason}",
                        protocol_number::name(protocol)
                    ));
                }
            }
        }

        if !failures.is_empty() || (ipcp_opened(&a).await && ipcp_opened(&b).await) {
            break;
        }
        if moved == 0 {
            registry.tick_all(restart).await;
        }
    }

    let statuses = [a.lock().await.status(), b.lock().await.status()];
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        for status in &statuses {
            print_status(status);
        }
    }

    if !failures.is_empty() {
        anyhow::bail!("negotiation failed: {}", failures.join("; "));
    }
    if !(ipcp_opened(&a).await && ipcp_opened(&b).await) {
        anyhow::bail!("negotiation did not converge after {MAX_ROUNDS} rounds");
    }
    Ok(())
}

/// Feed every queued frame into `to`, returning how many moved
async fn deliver(from: &mut mpsc::UnboundedReceiver<Frame>, to: &SharedLink) -> usize {
    let mut moved = 0;
    while let Ok(frame) = from.try_recv() {
        to.lock().await.input(frame.protocol, &frame.payload);
        moved += 1;
    }
    moved
}

async fn ipcp_opened(link: &SharedLink) -> bool {
    link.lock().await.state(protocol_number::IPCP) == Some(FsmState::Opened)
}

fn print_status(status: &LinkStatus) {
    println!("{}:", status.link);
    for (name, state) in &status.protocols {
        println!("  {name:<6} {state}");
    }
    if let Some(ipcp) = &status.ipcp {
        println!("  local   {}", ipcp.local);
        println!("  remote  {}", ipcp.remote);
        match (ipcp.vj_protocol, ipcp.vj_max_slot) {
            (Some(proto), Some(slot)) => println!("  vj      {proto:#06x} (max slot {slot})"),
            _ => println!("  vj      off"),
        }
        for dns in &ipcp.dns {
            println!("  dns     {dns}");
        }
    }
}
