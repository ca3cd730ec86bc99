//! `atcarc stations <ICAO>` – list an airport's stations and frequencies.

use anyhow::{Context, Result};
use atcarc_core::config::AtcarcConfig;
use atcarc_core::discovery::{DiscoveryClient, Station};

pub async fn run_stations(cfg: &AtcarcConfig, icao: &str) -> Result<()> {
    let client = DiscoveryClient::from_config(cfg);
    let code = icao.to_string();
    let stations = tokio::task::spawn_blocking(move || client.list_stations(&code))
        .await
        .context("station search task failed")??;

    if stations.is_empty() {
        println!("No stations found for {}.", icao.trim().to_ascii_uppercase());
        return Ok(());
    }
    for station in &stations {
        for line in station_lines(station) {
            println!("{line}");
        }
    }
    Ok(())
}

fn station_lines(station: &Station) -> Vec<String> {
    let status = if station.is_up { "UP" } else { "DOWN" };
    let mut lines = vec![format!(
        "[{}] - {} ({})",
        station.identifier, station.title, status
    )];
    lines.extend(
        station
            .frequencies
            .iter()
            .map(|f| format!("    {} - {}", f.label, f.frequency)),
    );
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use atcarc_core::discovery::Frequency;

    #[test]
    fn formats_station_with_frequencies() {
        let station = Station {
            identifier: "kpdx_twr".into(),
            title: "KPDX Del/Gnd/Twr".into(),
            is_up: true,
            frequencies: vec![Frequency {
                label: "KPDX Tower".into(),
                frequency: "118.700".into(),
            }],
        };
        assert_eq!(
            station_lines(&station),
            vec![
                "[kpdx_twr] - KPDX Del/Gnd/Twr (UP)".to_string(),
                "    KPDX Tower - 118.700".to_string(),
            ]
        );
    }
}
