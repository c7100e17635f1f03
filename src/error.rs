use thiserror::Error;

/// パイプライン全体で使うエラー型。
///
/// どのエラーも検出した時点で実験を中断させます。スイープ実行時のみ、
/// セル単位でログに記録したうえで残りのセルを続行します。
#[derive(Debug, Error)]
pub enum PodnnError {
    /// ハイパーパラメータの欠落・不正、空の学習データなど。
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// SVDの失敗や、基底抽出に入り込んだ非有限値。
    #[error("数値エラー: {0}")]
    Numerical(String),

    /// 学習中に損失が NaN / Inf になった。
    #[error("学習が発散しました (ステップ {step}, 損失 {loss})")]
    NumericalDivergence { step: usize, loss: f64 },

    /// 入力と出力のスナップショット数などが揃っていない。
    #[error("形状の不一致: {what} (期待値 {expected}, 実際 {actual})")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("テンソル変換に失敗しました: {0}")]
    Tensor(String),

    #[error("モデルの保存・読み込みに失敗しました: {0}")]
    Recorder(String),

    #[error("描画に失敗しました: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PodnnError>;

impl PodnnError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PodnnError::Configuration(msg.into())
    }

    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        PodnnError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}
