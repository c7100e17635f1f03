//! # PODNN コマンドラインプログラム
//!
//! ハイパーパラメータのJSONファイルを1つ受け取り (省略時は既定値)、
//! 縮約モデルの学習と評価を行って結果を出力ディレクトリに保存します。
//!
//! ## 使い方
//!
//! ```bash
//! cargo run --release -- hp.json --output results
//! ```
//!
//! ログの詳細さは `RUST_LOG` で変更できます (既定は `info`)。

use clap::Parser;
use podnn::cli::Cli;
use podnn::pipeline;

/// プログラムのエントリーポイント。
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = pipeline::run(&cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
