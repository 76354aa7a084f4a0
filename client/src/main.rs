use anyhow::{bail, Context, Result};
use clap::Parser;
use fabric_client::{
    channel::ChannelHandle,
    config::{BatchCommand, Config},
    gateway::{Collaborators, Gateway},
    identity::load_identity,
    simulator::{SimulatedNetwork, DEFAULT_CA_ADMIN_SECRET},
};
use fabric_common::{
    config::VERSION,
    identity::Identity,
    logger::{setup_logger, LoggerOptions},
    topology::NetworkTopology,
    utils::preview_payload,
};
use log::{error, info, warn};
use std::{fs::File, io::Write, path::Path, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config: Config = Config::parse();
    if let Some(path) = config.config_file.as_ref() {
        if config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {}", path);
                return Ok(());
            }

            let mut file = File::create(path).context("Error while creating config file")?;
            let json = serde_json::to_string_pretty(&config)
                .context("Error while serializing config file")?;
            file.write_all(json.as_bytes())
                .context("Error while writing config file")?;
            println!("Config file template generated at {}", path);
            return Ok(());
        }

        let file = File::open(path).context("Error while opening config file")?;
        config = serde_json::from_reader(file).context("Error while reading config file")?;
    } else if config.generate_config_template {
        eprintln!("Provided config file path is required to generate the template with --config-file");
        return Ok(());
    }

    let log_config = &config.log;
    setup_logger(LoggerOptions {
        level: log_config.log_level,
        file_level: log_config.file_log_level.unwrap_or(log_config.log_level),
        logs_path: &log_config.logs_path,
        filename: &log_config.filename_log,
        disable_file_logging: log_config.disable_file_logging,
        disable_file_log_date_based: log_config.disable_file_log_date_based,
        disable_colors: log_config.disable_log_color,
        modules: &log_config.logs_modules,
        datetime_format: &log_config.datetime_format,
    })?;

    info!("Fabric client v{}", VERSION);
    let topology = NetworkTopology::from_file(&config.topology)
        .with_context(|| format!("Error while loading topology {}", config.topology))?;
    summarize(&topology);

    if !config.simulate {
        check_admins(&topology);
        if config.batch_file.is_some() {
            bail!("Executing a batch requires a transport, use --simulate to run it in memory");
        }
        return Ok(());
    }

    let batch = match config.batch_file.as_ref() {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Error while opening batch file {}", path))?;
            serde_json::from_reader::<_, Vec<BatchCommand>>(file)
                .with_context(|| format!("Error while reading batch file {}", path))?
        }
        None => Vec::new(),
    };

    let network = SimulatedNetwork::from_topology(&topology);
    for key in topology.orgs.keys() {
        network.add_ca_admin(&admin_name(key), DEFAULT_CA_ADMIN_SECRET);
    }
    if config.simulate_existing_channels {
        for channel in &topology.channels {
            let members = topology.channel_members(&channel.name)?;
            let names: Vec<&str> = members.iter().map(|peer| peer.name.as_str()).collect();
            let orderer = topology.channel_orderer(&channel.name)?;
            network.preset_channel(&channel.name, &orderer.name, &names);
        }
    }

    let gateway = Gateway::new(
        topology,
        Collaborators::simulated(&network),
        config.gateway_settings(),
    )?;

    for (i, command) in batch.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, batch.len(), command.name());
        if let Err(e) = execute(&gateway, command).await {
            error!("Command #{} ({}) failed: {:#}", i + 1, command.name(), e);
            return Err(e);
        }
    }

    info!("{} commands executed", batch.len());
    Ok(())
}

fn summarize(topology: &NetworkTopology) {
    for (key, org) in &topology.orgs {
        info!(
            "Organization {} ({}): {} peers, CA {}",
            key,
            org.msp_id,
            org.peers.len(),
            org.ca.url
        );
    }

    for orderer in &topology.orderers {
        info!("Orderer {}", orderer);
    }

    for channel in &topology.channels {
        info!(
            "Channel '{}' with organizations [{}]",
            channel.name,
            channel.organizations.join(", ")
        );
    }
}

// Key files of every organization admin must be readable before talking to a real network
fn check_admins(topology: &NetworkTopology) {
    for (key, org) in &topology.orgs {
        match load_identity(&org.admin, org) {
            Ok(identity) => info!("Admin identity {} of {} is valid", identity, key),
            Err(e) => warn!("Admin identity of {} is not usable: {}", key, e),
        }
    }
}

// Bootstrap identity of each organization on the simulated CA
fn admin_name(org: &str) -> String {
    format!("{}-admin", org)
}

async fn open_channel(gateway: &Gateway, channel: &str) -> Result<Arc<ChannelHandle>> {
    let org = gateway.topology().channel_owner_key(channel)?.to_owned();
    let admin = gateway
        .enroll_admin(&org, &admin_name(&org), DEFAULT_CA_ADMIN_SECRET)
        .await?;
    Ok(gateway.open_channel(channel, admin).await?)
}

fn user(gateway: &Gateway, handle: &ChannelHandle, user: Option<&String>) -> Result<Arc<Identity>> {
    match user {
        Some(name) => gateway
            .identity_store()
            .get(name)
            .with_context(|| format!("Unknown user '{}', register it first", name)),
        None => Ok(Arc::clone(handle.identity())),
    }
}

async fn execute(gateway: &Gateway, command: &BatchCommand) -> Result<()> {
    match command {
        BatchCommand::OpenChannel { channel } => {
            let handle = open_channel(gateway, channel).await?;
            info!(
                "Channel '{}' {} with {} peers",
                handle.name(),
                handle.mode(),
                handle.peers().len()
            );
            for failure in handle.failed_joins() {
                warn!("Join failure: {}", failure);
            }
        }
        BatchCommand::Install {
            channel,
            chaincode,
            archive,
        } => {
            let handle = open_channel(gateway, channel).await?;
            let report = gateway
                .lifecycle()
                .install(&handle, chaincode, archive)
                .await?;
            info!(
                "Chaincode {} installed on [{}]",
                report.chaincode,
                report.succeeded().collect::<Vec<_>>().join(", ")
            );
            for failure in report.failures() {
                warn!("Install failure: {}", failure);
            }
        }
        BatchCommand::Deploy { channel, chaincode } => {
            let handle = open_channel(gateway, channel).await?;
            let report = gateway.lifecycle().deploy(&handle, chaincode).await?;
            info!(
                "Chaincode {} deployed ({}) in block {}",
                report.chaincode, report.mode, report.block_number
            );
        }
        BatchCommand::Instantiate { channel, chaincode } => {
            let handle = open_channel(gateway, channel).await?;
            let report = gateway.lifecycle().instantiate(&handle, chaincode).await?;
            info!(
                "Chaincode {} instantiated in block {}",
                report.chaincode, report.block_number
            );
        }
        BatchCommand::Upgrade { channel, chaincode } => {
            let handle = open_channel(gateway, channel).await?;
            let report = gateway.lifecycle().upgrade(&handle, chaincode).await?;
            info!(
                "Chaincode {} upgraded in block {}",
                report.chaincode, report.block_number
            );
        }
        BatchCommand::Version { channel } => {
            let handle = open_channel(gateway, channel).await?;
            let tracker = gateway.version_tracker();
            match tracker.current_descriptor(&handle).await? {
                Some(current) => info!("Channel '{}' runs {}", channel, current),
                None => info!("Channel '{}' has no instantiated chaincode", channel),
            }
            info!(
                "Next version for channel '{}': {}",
                channel,
                tracker.next_version(&handle).await?
            );
        }
        BatchCommand::Invoke {
            channel,
            function,
            args,
            user: name,
        } => {
            let handle = open_channel(gateway, channel).await?;
            let identity = user(gateway, &handle, name.as_ref())?;
            let result = gateway
                .transactions()
                .invoke_as(&handle, identity, function, args.clone())
                .await?;
            info!(
                "Transaction {} committed in block {}: {}",
                result.tx_id,
                result.block_number,
                preview_payload(&result.payload, 256)
            );
        }
        BatchCommand::Query {
            channel,
            function,
            args,
            user: name,
        } => {
            let handle = open_channel(gateway, channel).await?;
            let identity = user(gateway, &handle, name.as_ref())?;
            let result = gateway
                .transactions()
                .query_as(&handle, identity, function, args.clone())
                .await?;
            info!(
                "Query answered by {}: {}",
                result.peer,
                preview_payload(&result.payload, 256)
            );
        }
        BatchCommand::Register { org, username } => {
            let registrar = gateway
                .enroll_admin(org, &admin_name(org), DEFAULT_CA_ADMIN_SECRET)
                .await?;
            let identity = gateway.membership(org, registrar)?.register(username).await?;
            info!("User {} registered", identity);
        }
    }

    Ok(())
}
