#![allow(dead_code)]

//! Small ONNX graphs written the way skl2onnx lays out a linear classifier.

use prost::Message;
use std::path::{Path, PathBuf};
use tract_onnx::pb;
use tract_onnx::pb::attribute_proto::AttributeType;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::tensor_shape_proto::{dimension, Dimension};

use cardio_api::models::CardioFeatures;
use cardio_api::types::FEATURE_COLUMNS;

/// Same weights as `tests/fixtures/cardio_logistic.json`.
pub const WEIGHTS: [f32; 10] = [0.05, 0.0, 0.04, 0.01, 0.5, -0.1, -0.1, -0.2, -0.2, 0.03];
pub const BIAS: f32 = -10.0;

pub fn low_risk() -> CardioFeatures {
    CardioFeatures {
        age: 50,
        gender: 1,
        ap_hi: 120,
        ap_lo: 80,
        cholesterol: 1,
        gluc: 1,
        smoke: 0,
        alco: 0,
        active: 1,
        bmi: 24.5,
    }
}

pub fn high_risk() -> CardioFeatures {
    CardioFeatures {
        age: 62,
        gender: 2,
        ap_hi: 160,
        ap_lo: 100,
        cholesterol: 3,
        gluc: 1,
        smoke: 1,
        alco: 0,
        active: 0,
        bmi: 31.0,
    }
}

/// Weight vector with a single non-zero entry for `column`.
pub fn only(column: &str, weight: f32) -> Vec<f32> {
    FEATURE_COLUMNS
        .iter()
        .map(|c| if *c == column { weight } else { 0.0 })
        .collect()
}

fn input(name: &str, elem: DataType, width: i64) -> pb::ValueInfoProto {
    let dim = vec![
        Dimension {
            value: Some(dimension::Value::DimParam("N".to_string())),
            ..Default::default()
        },
        Dimension {
            value: Some(dimension::Value::DimValue(width)),
            ..Default::default()
        },
    ];
    pb::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(pb::TypeProto {
            value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                elem_type: elem as i32,
                shape: Some(pb::TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn output(name: &str) -> pb::ValueInfoProto {
    pb::ValueInfoProto {
        name: name.to_string(),
        ..Default::default()
    }
}

fn floats(name: &str, dims: &[i64], data: Vec<f32>) -> pb::TensorProto {
    pb::TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: DataType::Float as i32,
        float_data: data,
        ..Default::default()
    }
}

fn int_attr(name: &str, value: i64) -> pb::AttributeProto {
    pb::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

fn node(op: &str, inputs: &[&str], outputs: &[&str], attribute: Vec<pb::AttributeProto>) -> pb::NodeProto {
    pb::NodeProto {
        name: outputs[0].to_string(),
        op_type: op.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        attribute,
        ..Default::default()
    }
}

fn encode(graph: pb::GraphProto) -> Vec<u8> {
    pb::ModelProto {
        ir_version: 8,
        opset_import: vec![pb::OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        producer_name: "cardio-api-tests".to_string(),
        graph: Some(graph),
        ..Default::default()
    }
    .encode_to_vec()
}

/// `X @ W + B -> ArgMax`, with the class-1 column of `W` set to `weights`.
/// A `probabilities` output is declared ahead of `label`.
fn linear_head(weights: &[f32], bias: f32, features: &str) -> (Vec<pb::NodeProto>, Vec<pb::TensorProto>) {
    let width = weights.len() as i64;
    let w = weights.iter().flat_map(|w| [0.0, *w]).collect();
    let nodes = vec![
        node("MatMul", &[features, "W"], &["logits"], vec![]),
        node("Add", &["logits", "B"], &["probabilities"], vec![]),
        node(
            "ArgMax",
            &["probabilities"],
            &["label"],
            vec![int_attr("axis", 1), int_attr("keepdims", 0)],
        ),
    ];
    let initializers = vec![
        floats("W", &[width, 2], w),
        floats("B", &[2], vec![0.0, bias]),
    ];
    (nodes, initializers)
}

/// Linear classifier over one `[N, weights.len()]` input of type `elem`.
pub fn packed_classifier(elem: DataType, weights: &[f32], bias: f32) -> Vec<u8> {
    let mut nodes = Vec::new();
    let features = if elem == DataType::Float {
        "X"
    } else {
        nodes.push(node("Cast", &["X"], &["X_float"], vec![int_attr("to", DataType::Float as i64)]));
        "X_float"
    };
    let (head, initializer) = linear_head(weights, bias, features);
    nodes.extend(head);
    encode(pb::GraphProto {
        name: "packed".to_string(),
        node: nodes,
        initializer,
        input: vec![input("X", elem, weights.len() as i64)],
        output: vec![output("probabilities"), output("label")],
        ..Default::default()
    })
}

/// Linear classifier with one `[N, 1]` float input per named column.
pub fn per_column_classifier(names: &[&str], weights: &[f32], bias: f32) -> Vec<u8> {
    let mut nodes = vec![node("Concat", names, &["X"], vec![int_attr("axis", 1)])];
    let (head, initializer) = linear_head(weights, bias, "X");
    nodes.extend(head);
    encode(pb::GraphProto {
        name: "per_column".to_string(),
        node: nodes,
        initializer,
        input: names.iter().map(|n| input(n, DataType::Float, 1)).collect(),
        output: vec![output("probabilities"), output("label")],
        ..Default::default()
    })
}

/// Regressor whose float `label` is `X @ weights`.
pub fn packed_regressor(weights: &[f32]) -> Vec<u8> {
    encode(pb::GraphProto {
        name: "regressor".to_string(),
        node: vec![node("MatMul", &["X", "W"], &["label"], vec![])],
        initializer: vec![floats("W", &[weights.len() as i64, 1], weights.to_vec())],
        input: vec![input("X", DataType::Float, weights.len() as i64)],
        output: vec![output("label")],
        ..Default::default()
    })
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
