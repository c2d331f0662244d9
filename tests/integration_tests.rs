use sumo_viz::batch;
use sumo_viz::congestion::{CongestionSnapshot, CountLevel, Policy, Throttle};
use sumo_viz::edges;
use sumo_viz::net::{Bounds, NetworkDocumentParser};
use sumo_viz::telemetry::TelemetryChannel;
use std::time::Duration;

#[test]
fn test_static_geometry_pipeline() {
    let text = include_str!("fixtures/sample_net.xml");
    let model = NetworkDocumentParser::new().parse(text).expect("fixture must parse");

    // Document to model
    assert!(model.bounds.is_some());
    assert_eq!(model.signals.len(), 1);

    // Model to per-edge representatives
    let edge_set = edges::aggregate(&model.lanes);
    assert_eq!(edge_set.len(), 3);
    let e1 = edge_set.iter().find(|e| e.id == "E1").expect("edge E1");
    assert_eq!(e1.points.len(), 3); // E1_1 has more points than E1_0
    assert_eq!(e1.speed_limit, 13.89);

    // Unreported speeds fall back to the urban free-flow constant
    let e3 = edge_set.iter().find(|e| e.id == "E3").expect("edge E3");
    assert_eq!(e3.speed_limit, edges::DEFAULT_SPEED_LIMIT);

    // Internal connectors stay out of the edge set
    let internals = edges::internal_geometries(&model.lanes);
    assert_eq!(internals.len(), 1);

    // Batching round-trips the exact geometry
    let geometries: Vec<_> = edge_set.iter().map(|e| e.points.clone()).collect();
    let batches = batch::batch(&geometries, 2);
    let rejoined: Vec<_> = batches.into_iter().flatten().collect();
    assert_eq!(rejoined, geometries);

    // The bounds filter keeps everything inside the document's own bounds
    let bounds = model.bounds.unwrap();
    assert_eq!(batch::filter_to_bounds(&geometries, &bounds).len(), geometries.len());

    // A window away from the network keeps nothing
    let elsewhere = Bounds {
        min_x: 10_000.0,
        min_y: 10_000.0,
        max_x: 10_010.0,
        max_y: 10_010.0,
    };
    assert!(batch::filter_to_bounds(&geometries, &elsewhere).is_empty());
}

#[test]
fn test_live_telemetry_pipeline() {
    let text = include_str!("fixtures/sample_net.xml");
    let model = NetworkDocumentParser::new().parse(text).expect("fixture must parse");

    let mut channel =
        TelemetryChannel::new(Policy::Count).with_throttle(Throttle::new(Duration::ZERO));
    channel.set_static_network(&model);

    // Seven vehicles on E1 (heavy), one on E2 (light), none on E3 (open),
    // plus one record with no usable coordinates that must vanish silently.
    let mut vehicles: Vec<String> = (0..7)
        .map(|i| format!(r#"{{"id":"veh{i}","x":10.0,"y":95.0,"speed":2.0,"lane":"E1_0"}}"#))
        .collect();
    vehicles.push(r#"{"id":"veh7","x":103.6,"y":150.0,"speed":8.0,"lane":"E2_0"}"#.to_string());
    vehicles.push(r#"{"id":"broken","x":null,"y":null,"lane":"E2_0"}"#.to_string());

    let frame = format!(
        r#"{{"type":"viz","step":42,"ts":1700000000000,"vehicles":[{}],"tls":[{{"id":"J1","state":"GrGr"}}]}}"#,
        vehicles.join(",")
    );
    channel.handle_frame(&frame);

    assert_eq!(channel.vehicles().len(), 8);
    assert_eq!(channel.last_step(), Some(42));
    assert_eq!(channel.signals()["J1"].state, "GrGr");

    let Some(CongestionSnapshot::Count(levels)) = channel.congestion() else {
        panic!("expected a count snapshot");
    };
    assert_eq!(levels["E1"], CountLevel::Heavy);
    assert_eq!(levels["E2"], CountLevel::Light);
    assert_eq!(levels["E3"], CountLevel::Open);
}
