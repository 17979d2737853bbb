use chrono::{TimeZone, Utc};
use crm_core::{
    entity::{Deal, DealStage},
    pipeline::PipelineSummary,
};

fn deal(id: i64, stage: DealStage, value: f64, probability: u8) -> Deal {
    let at = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    Deal {
        id,
        customer_id:  1,
        title:        format!("Deal {id}"),
        company_name: "Acme".into(),
        stage,
        value,
        probability,
        assigned_to:  None,
        created_at:   at,
        updated_at:   at,
    }
}

#[test]
fn pipeline_breaks_down_every_stage_in_order() {
    let deals = vec![
        deal(1, DealStage::Lead, 10_000.0, 10),
        deal(2, DealStage::Proposal, 30_000.0, 50),
        deal(3, DealStage::Proposal, 20_000.0, 70),
        deal(4, DealStage::Closed, 25_000.0, 100),
        deal(5, DealStage::Lost, 15_000.0, 0),
    ];
    let p = PipelineSummary::from_deals(&deals);

    let stages: Vec<DealStage> = p.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, DealStage::ALL.to_vec());

    let proposal = &p.stages[2];
    assert_eq!(proposal.count, 2);
    assert_eq!(proposal.value, 50_000.0);
    assert_eq!(proposal.value_share, 50.0);

    assert_eq!(p.total_deals, 5);
    assert_eq!(p.total_value, 100_000.0);
    assert_eq!(p.open_value, 60_000.0);
    // 10k × 0.1 + 30k × 0.5 + 20k × 0.7
    assert_eq!(p.weighted_forecast, 30_000.0);
    assert_eq!(p.win_rate, 50.0);

    let share_total: f64 = p.stages.iter().map(|s| s.value_share).sum();
    assert!((share_total - 100.0).abs() < 0.05, "shares sum to {share_total}");
}

#[test]
fn empty_pipeline_is_all_zero() {
    let p = PipelineSummary::from_deals(&[]);
    assert_eq!(p.stages.len(), 6);
    assert!(p.stages.iter().all(|s| s.count == 0 && s.value_share == 0.0));
    assert_eq!(p.total_value, 0.0);
    assert_eq!(p.weighted_forecast, 0.0);
    assert_eq!(p.win_rate, 0.0);
}

#[test]
fn pipeline_serializes_camel_case() {
    let p = PipelineSummary::from_deals(&[deal(1, DealStage::Qualified, 1_000.0, 40)]);
    let json = serde_json::to_value(&p).unwrap();
    assert_eq!(json["weightedForecast"], 400.0);
    assert_eq!(json["stages"][1]["stage"], "qualified");
    assert_eq!(json["stages"][1]["valueShare"], 100.0);
}
