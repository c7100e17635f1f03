use clap::Parser;
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Reduced-order surrogate models for parametric PDEs (POD + neural network)", long_about = None)]
pub struct Cli {
    /// ハイパーパラメータのJSONファイル。省略すると組み込みの既定値を使います
    pub config: Option<PathBuf>,

    /// 結果を書き出すディレクトリ
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_optional() {
        let cli = Cli::try_parse_from(["podnn"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.output, PathBuf::from("results"));

        let cli = Cli::try_parse_from(["podnn", "hp.json", "-o", "out"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("hp.json")));
        assert_eq!(cli.output, PathBuf::from("out"));
    }
}
