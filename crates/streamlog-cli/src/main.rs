//! logctl - StreamLog command-line tool
//!
//! Three entry points sharing one binary:
//!
//! ```bash
//! # Paced load generation with idempotent sequences
//! logctl produce --topic orders --rate 500 --size 256 --duration 30 \
//!     --producer-id p1 --acks leader
//!
//! # Group consumption: poll assignments, fetch, commit, optionally follow
//! logctl consume --topic orders --group analytics --from committed --follow
//!
//! # Topic administration
//! logctl admin create-topic --topic orders --partitions 3 --replication-factor 1
//! logctl admin describe-topic --topic orders
//! logctl admin list-topics
//! ```
//!
//! Exit code 0 on success, 1 on any failure. Producer retries transient
//! error codes with exponential backoff; idempotent sequences make those
//! retries exact.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use streamlog_core::{ErrorClass, ErrorCode};
use streamlog_proto::streamlog::broker_client::BrokerClient;
use streamlog_proto::streamlog::controller_client::ControllerClient;
use streamlog_proto::streamlog::coordinator_client::CoordinatorClient;
use streamlog_proto::streamlog::{
    AckLevel, CommitOffsetRequest, CreateTopicRequest, DescribeTopicRequest, FetchRequest,
    GetCommittedOffsetRequest, ListTopicsRequest, PollAssignmentRequest, ProduceRequest, Record,
};

#[derive(Parser)]
#[command(name = "logctl")]
#[command(about = "StreamLog command-line tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce records at a fixed rate
    Produce {
        /// Broker host
        #[arg(long, env = "STREAMLOG_BROKER", default_value = "127.0.0.1")]
        broker: String,

        /// Broker port
        #[arg(long, default_value_t = 9092)]
        port: u16,

        /// Topic name
        #[arg(long)]
        topic: String,

        /// Partition to append to
        #[arg(long, default_value_t = 0)]
        partition: i32,

        /// Records per second
        #[arg(long, default_value_t = 100)]
        rate: u32,

        /// Value size in bytes
        #[arg(long, default_value_t = 100)]
        size: usize,

        /// Acknowledgement level: leader | quorum
        #[arg(long, default_value = "leader")]
        acks: String,

        /// How long to produce, in seconds
        #[arg(long, default_value_t = 10)]
        duration: u64,

        /// Idempotent producer id (empty disables sequencing)
        #[arg(long, default_value = "")]
        producer_id: String,
    },

    /// Consume a topic through a consumer group
    Consume {
        /// Broker address (host:port)
        #[arg(long, env = "STREAMLOG_BROKER_ADDR", default_value = "127.0.0.1:9092")]
        broker: String,

        /// Coordinator address (host:port)
        #[arg(
            long,
            env = "STREAMLOG_COORDINATOR_ADDR",
            default_value = "127.0.0.1:9095"
        )]
        coordinator: String,

        /// Topic name
        #[arg(long)]
        topic: String,

        /// Consumer group id
        #[arg(long, default_value = "logctl")]
        group: String,

        /// Start position: committed | earliest | <offset>
        #[arg(long, default_value = "committed")]
        from: String,

        /// Fetch byte budget per request
        #[arg(long, default_value_t = 1 << 20)]
        max_bytes: i64,

        /// Keep fetching after reaching the log end
        #[arg(long)]
        follow: bool,
    },

    /// Topic administration
    Admin {
        /// Controller host
        #[arg(long, env = "STREAMLOG_CONTROLLER", default_value = "127.0.0.1")]
        controller: String,

        /// Controller port
        #[arg(long, default_value_t = 9093)]
        port: u16,

        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a topic
    CreateTopic {
        #[arg(long)]
        topic: String,

        #[arg(long, default_value_t = 1)]
        partitions: i32,

        #[arg(long, default_value_t = 1)]
        replication_factor: i32,
    },

    /// Show a topic's partitions, replicas, and leader
    DescribeTopic {
        #[arg(long)]
        topic: String,
    },

    /// List all topics
    ListTopics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Produce {
            broker,
            port,
            topic,
            partition,
            rate,
            size,
            acks,
            duration,
            producer_id,
        } => {
            produce(
                &format!("http://{broker}:{port}"),
                &topic,
                partition,
                rate,
                size,
                &acks,
                Duration::from_secs(duration),
                &producer_id,
            )
            .await
        }
        Commands::Consume {
            broker,
            coordinator,
            topic,
            group,
            from,
            max_bytes,
            follow,
        } => {
            consume(
                &format!("http://{broker}"),
                &format!("http://{coordinator}"),
                &topic,
                &group,
                &from,
                max_bytes,
                follow,
            )
            .await
        }
        Commands::Admin {
            controller,
            port,
            command,
        } => admin(&format!("http://{controller}:{port}"), command).await,
    }
}

// ---------------------------------------------------------------------------
// produce
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn produce(
    endpoint: &str,
    topic: &str,
    partition: i32,
    rate: u32,
    size: usize,
    acks: &str,
    duration: Duration,
    producer_id: &str,
) -> Result<()> {
    if rate == 0 {
        bail!("--rate must be positive");
    }
    let ack = match acks {
        "leader" => AckLevel::AckLeader,
        "quorum" => AckLevel::AckQuorum,
        other => bail!("unknown acks level: {other} (expected leader or quorum)"),
    };

    let mut client = BrokerClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("connecting to broker at {endpoint}"))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1) / rate);
    let started = Instant::now();
    let mut sequence: i64 = 0;
    let mut sent: u64 = 0;
    let mut replayed: u64 = 0;
    let mut last_offset: i64 = -1;

    while started.elapsed() < duration {
        ticker.tick().await;

        let record = Record {
            key: format!("{topic}-{sequence}").into_bytes(),
            value: vec![b'x'; size],
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };
        let request = ProduceRequest {
            topic: topic.to_string(),
            partition,
            records: vec![record],
            producer_id: producer_id.to_string(),
            sequence,
            ack: ack as i32,
        };

        let mut backoff = Duration::from_millis(50);
        let response = loop {
            match client.produce(request.clone()).await {
                Ok(response) => {
                    let body = response.into_inner();
                    let code = ErrorCode::from_wire(body.error_code);
                    match code.class() {
                        ErrorClass::Success => break body,
                        ErrorClass::Retryable => {
                            eprintln!("retrying after {code}: {}", body.error_message);
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(Duration::from_secs(2));
                        }
                        ErrorClass::ClientError | ErrorClass::Fatal => {
                            bail!("produce failed with {code}: {}", body.error_message);
                        }
                    }
                }
                Err(status) => {
                    eprintln!("transport error, retrying: {status}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
            }
        };

        if ErrorCode::from_wire(response.error_code) == ErrorCode::IdempotentReplay {
            replayed += 1;
        } else {
            sent += 1;
        }
        last_offset = response.base_offset;
        sequence += 1;
    }

    println!(
        "produced {sent} records to {topic}/{partition} in {:.1}s (replays: {replayed}, last offset: {last_offset})",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// consume
// ---------------------------------------------------------------------------

async fn consume(
    broker_endpoint: &str,
    coordinator_endpoint: &str,
    topic: &str,
    group: &str,
    from: &str,
    max_bytes: i64,
    follow: bool,
) -> Result<()> {
    let mut broker = BrokerClient::connect(broker_endpoint.to_string())
        .await
        .with_context(|| format!("connecting to broker at {broker_endpoint}"))?;
    let mut coordinator = CoordinatorClient::connect(coordinator_endpoint.to_string())
        .await
        .with_context(|| format!("connecting to coordinator at {coordinator_endpoint}"))?;

    let member_id = format!("logctl-{}", std::process::id());

    let poll = coordinator
        .poll_assignment(PollAssignmentRequest {
            group_id: group.to_string(),
            member_id: member_id.clone(),
            topics: vec![topic.to_string()],
        })
        .await
        .context("polling assignment")?
        .into_inner();
    let code = ErrorCode::from_wire(poll.error_code);
    if code != ErrorCode::Ok {
        bail!("assignment failed with {code}: {}", poll.error_message);
    }
    let heartbeat_interval = Duration::from_millis(poll.heartbeat_interval_ms.max(500) as u64);

    let mut partitions: Vec<i32> = poll
        .assignments
        .iter()
        .filter(|a| a.topic == topic)
        .flat_map(|a| a.partitions.iter().copied())
        .collect();
    partitions.sort_unstable();

    if partitions.is_empty() && !follow {
        bail!(
            "no partitions assigned for topic {topic} \
             (does the topic exist on the controller?)"
        );
    }
    eprintln!("member {member_id} assigned partitions {partitions:?}");

    // Resolve the start offset per partition
    let mut cursors: Vec<(i32, i64)> = Vec::new();
    for partition in &partitions {
        let offset = match from {
            "earliest" => 0,
            "committed" => {
                coordinator
                    .get_committed_offset(GetCommittedOffsetRequest {
                        group_id: group.to_string(),
                        topic: topic.to_string(),
                        partition: *partition,
                    })
                    .await
                    .context("reading committed offset")?
                    .into_inner()
                    .offset
            }
            explicit => explicit
                .parse::<i64>()
                .with_context(|| format!("--from must be committed, earliest, or an offset, got {explicit:?}"))?,
        };
        cursors.push((*partition, offset));
    }

    let mut last_heartbeat = Instant::now();
    loop {
        let mut any_progress = false;

        for (partition, offset) in cursors.iter_mut() {
            let response = broker
                .fetch(FetchRequest {
                    topic: topic.to_string(),
                    partition: *partition,
                    offset: *offset,
                    max_bytes,
                })
                .await
                .context("fetch")?
                .into_inner();

            match ErrorCode::from_wire(response.error_code) {
                ErrorCode::Ok => {}
                ErrorCode::OffsetOutOfRange => {
                    eprintln!(
                        "partition {partition}: offset {offset} out of range, resetting to high watermark {}",
                        response.high_watermark
                    );
                    *offset = response.high_watermark;
                    continue;
                }
                ErrorCode::DataLoss => {
                    eprintln!(
                        "partition {partition}: corruption reported, continuing with partial data"
                    );
                }
                code => bail!("fetch failed with {code}: {}", response.error_message),
            }

            let mut progressed = false;
            for batch in &response.batches {
                for (i, record) in batch.records.iter().enumerate() {
                    let record_offset = batch.base_offset + i as i64;
                    if record_offset < *offset {
                        // The batch covers offsets before the cursor
                        continue;
                    }
                    println!(
                        "{partition}\t{record_offset}\t{}\t{}",
                        String::from_utf8_lossy(&record.key),
                        String::from_utf8_lossy(&record.value)
                    );
                    *offset = record_offset + 1;
                    progressed = true;
                }
            }

            if progressed {
                any_progress = true;
                coordinator
                    .commit_offset(CommitOffsetRequest {
                        group_id: group.to_string(),
                        topic: topic.to_string(),
                        partition: *partition,
                        offset: *offset,
                    })
                    .await
                    .context("committing offset")?;
            }
        }

        if !follow && !any_progress {
            // Caught up everywhere
            return Ok(());
        }

        if follow && last_heartbeat.elapsed() >= heartbeat_interval {
            let poll = coordinator
                .poll_assignment(PollAssignmentRequest {
                    group_id: group.to_string(),
                    member_id: member_id.clone(),
                    topics: vec![topic.to_string()],
                })
                .await
                .context("heartbeat poll")?
                .into_inner();
            last_heartbeat = Instant::now();

            let mut assigned: Vec<i32> = poll
                .assignments
                .iter()
                .filter(|a| a.topic == topic)
                .flat_map(|a| a.partitions.iter().copied())
                .collect();
            assigned.sort_unstable();
            if assigned != partitions {
                eprintln!("assignment changed: {partitions:?} -> {assigned:?}");
                // Keep cursors for retained partitions, start new ones at 0
                cursors.retain(|(p, _)| assigned.contains(p));
                for p in &assigned {
                    if !cursors.iter().any(|(q, _)| q == p) {
                        cursors.push((*p, 0));
                    }
                }
                cursors.sort_unstable_by_key(|(p, _)| *p);
                partitions = assigned;
            }
        }

        if follow && !any_progress {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// admin
// ---------------------------------------------------------------------------

async fn admin(endpoint: &str, command: AdminCommands) -> Result<()> {
    let mut client = ControllerClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("connecting to controller at {endpoint}"))?;

    match command {
        AdminCommands::CreateTopic {
            topic,
            partitions,
            replication_factor,
        } => {
            let response = client
                .create_topic(CreateTopicRequest {
                    topic: topic.clone(),
                    partitions,
                    replication_factor,
                })
                .await
                .context("create topic")?
                .into_inner();
            if !response.success {
                bail!(
                    "create-topic failed with {}: {}",
                    ErrorCode::from_wire(response.error_code),
                    response.error_message
                );
            }
            println!("created topic {topic} ({partitions} partitions)");
        }
        AdminCommands::DescribeTopic { topic } => {
            let response = client
                .describe_topic(DescribeTopicRequest {
                    topic: topic.clone(),
                })
                .await
                .context("describe topic")?
                .into_inner();
            let code = ErrorCode::from_wire(response.error_code);
            if code != ErrorCode::Ok {
                bail!("describe-topic failed with {code}: {}", response.error_message);
            }
            println!("topic: {}", response.topic);
            for partition in &response.partitions {
                println!(
                    "  partition {}: leader={} replicas={:?}",
                    partition.partition, partition.leader, partition.replicas
                );
            }
        }
        AdminCommands::ListTopics => {
            let response = client
                .list_topics(ListTopicsRequest {})
                .await
                .context("list topics")?
                .into_inner();
            for topic in response.topics {
                println!("{topic}");
            }
        }
    }
    Ok(())
}
