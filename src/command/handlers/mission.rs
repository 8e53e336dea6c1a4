//! Mission-starting command handlers
//!
//! Each handler parses its parameters out of the envelope body, builds the
//! mission and submits it to the coordinator on a fresh task. A body that
//! does not parse is rejected with a warning and nothing is submitted.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use skylink_shared::CommandType;

use super::HandlerContext;
use crate::autopilot::GlobalPosition;
use crate::command::CommandServer;
use crate::mission::{CoarseScanMission, DemoMission, Mission, UpDownMission};

/// Ground consoles send numeric fields either as JSON numbers or as the raw
/// text of an input box; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberField {
    Number(f64),
    Text(String),
}

impl NumberField {
    fn value(&self) -> Result<f64> {
        match self {
            NumberField::Number(n) => Ok(*n),
            NumberField::Text(t) => t
                .trim()
                .parse()
                .map_err(|_| anyhow!("not a number: {t:?}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DemoParams {
    lat: NumberField,
    lon: NumberField,
    alt: NumberField,
}

#[derive(Debug, Deserialize)]
struct UpDownParams {
    alt: NumberField,
}

/// Wire contract for the scan: `distance` is the initial leg length, `j`
/// bounds the number of direction changes
#[derive(Debug, Deserialize)]
struct ScanParams {
    alt: NumberField,
    distance: NumberField,
    j: NumberField,
}

fn demo_mission(body: &Value) -> Result<DemoMission> {
    let params: DemoParams =
        serde_json::from_value(body.clone()).context("demo mission body")?;
    Ok(DemoMission::new(GlobalPosition::new(
        params.lat.value()?,
        params.lon.value()?,
        params.alt.value()?,
    )))
}

fn up_down_mission(body: &Value) -> Result<UpDownMission> {
    let params: UpDownParams =
        serde_json::from_value(body.clone()).context("up-down mission body")?;
    Ok(UpDownMission::new(params.alt.value()?))
}

fn coarse_scan_mission(ctx: &HandlerContext, body: &Value) -> Result<CoarseScanMission> {
    let params: ScanParams =
        serde_json::from_value(body.clone()).context("coarse scan mission body")?;
    let legs = params.j.value()?;
    if legs < 0.0 {
        return Err(anyhow!("negative direction-change bound: {legs}"));
    }
    Ok(CoarseScanMission::new(
        params.alt.value()?,
        params.distance.value()?,
        legs as u32,
        ctx.finder.clone(),
    ))
}

/// Hand a mission to the coordinator on its own task, so the multi-minute
/// poll loops never run on the dispatch task
fn submit(ctx: &HandlerContext, mission: impl Mission + 'static) {
    let coordinator = ctx.coordinator.clone();
    tokio::spawn(async move {
        coordinator.execute(&mission).await;
    });
}

pub(super) fn register(server: &CommandServer, ctx: &HandlerContext) {
    let demo_ctx = ctx.clone();
    server.register_handler(CommandType::DemoMission, move |body| {
        match demo_mission(&body) {
            Ok(mission) => submit(&demo_ctx, mission),
            Err(e) => warn!("Demo mission rejected: {e:#}"),
        }
    });

    let up_down_ctx = ctx.clone();
    server.register_handler(CommandType::UpDownMission, move |body| {
        match up_down_mission(&body) {
            Ok(mission) => submit(&up_down_ctx, mission),
            Err(e) => warn!("Up-down mission rejected: {e:#}"),
        }
    });

    let scan_ctx = ctx.clone();
    server.register_handler(CommandType::CoarseScanMission, move |body| {
        match coarse_scan_mission(&scan_ctx, &body) {
            Ok(mission) => submit(&scan_ctx, mission),
            Err(e) => warn!("Coarse scan mission rejected: {e:#}"),
        }
    });
}
