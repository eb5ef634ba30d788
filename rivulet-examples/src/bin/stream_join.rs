use std::time::Duration;

use rivulet_api::runner::ApplicationRunner;
use rivulet_api::{InMemorySystem, RunnerRegistry, StreamApplication};
use rivulet_core::codec::KvSerde;
use rivulet_core::config::{Config, JOB_PARTITIONS};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Impression {
    ad_id: String,
    member: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Click {
    ad_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AdEngagement {
    ad_id: String,
    member: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let system = InMemorySystem::new();
    system.create_stream("impressions", 2);
    system.create_stream("clicks", 2);
    for (ad, member) in [("ad-1", "m1"), ("ad-2", "m2"), ("ad-3", "m1")] {
        let impression = Impression {
            ad_id: ad.to_string(),
            member: member.to_string(),
        };
        system.send("impressions", ad.to_string(), impression, None)?;
    }
    for ad in ["ad-3", "ad-1", "ad-9"] {
        system.send("clicks", ad.to_string(), Click { ad_id: ad.to_string() }, None)?;
    }

    let app = StreamApplication::new("ad-engagement");
    let impressions =
        app.open_input::<Impression>("impressions", KvSerde::bincode::<String, Impression>())?;
    let clicks = app.open_input::<Click>("clicks", KvSerde::bincode::<String, Click>())?;
    let engagements = app.open_output::<AdEngagement>(
        "engagements",
        KvSerde::bincode::<String, AdEngagement>(),
    )?;
    impressions
        .join(
            &clicks,
            |i: &Impression| i.ad_id.clone(),
            |c: &Click| c.ad_id.clone(),
            |i: &Impression, _: &Click| AdEngagement {
                ad_id: i.ad_id.clone(),
                member: i.member.clone(),
            },
            Duration::from_secs(10 * 60),
        )
        .send_to(&engagements);

    let config = Config::new().with(JOB_PARTITIONS, 2);
    let runner = RunnerRegistry::local(system.clone()).create(&config)?;
    let summary = runner.run(&app)?;
    tracing::info!("run finished: {:?}", summary);

    for (ad, engagement) in system.read_all::<String, AdEngagement>("engagements")? {
        println!("ad={} member={}", ad, engagement.member);
    }
    Ok(())
}
