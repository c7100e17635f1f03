//! # POD + ニューラルネットワークによる縮約モデル (PODNN)
//!
//! パラメトリック偏微分方程式の高精度スナップショットから、固有直交分解 (POD) で
//! 低次元の基底を取り出し、問題パラメータから縮約係数への回帰を `burn` の
//! ニューラルネットワークで学習して、全場の予測と誤差評価を行います。
//!
//! 処理は 基底抽出 → 分割 → 学習 → 予測 → 再構成 → 評価 の一方向の流れで、
//! [`pipeline::run_experiment`] がこれをまとめて実行します。

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod handling;
pub mod inference;
pub mod io;
pub mod loss;
pub mod mesh;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod pod;
pub mod report;
pub mod scaling;
pub mod sweep;
pub mod training;

pub use error::{PodnnError, Result};
