use std::path::Path;
use std::process::ExitCode;

use nalgebra::DMatrix;
use num_complex::Complex64;
use sle_core::{ChaChaRandomSource, LocalMatrixHandle};
use sle_eps::{CissConfig, CissSolver, Region};
use sle_svd::{CyclicSvd, CyclicSvdConfig, Which};

fn usage() {
    eprintln!("usage:");
    eprintln!("  sle-cli ciss <matrix.txt> [flags...]");
    eprintln!("  sle-cli cyclic-svd <matrix.txt> [flags...]");
    eprintln!("  sle-cli --help");
    eprintln!();
    eprintln!("ciss flags:");
    eprintln!("  --region-center RE,IM   (default 0,0)");
    eprintln!("  --region-radius R       (default 1.0)");
    eprintln!("  --region-vscale V       (default 1.0)");
    eprintln!("  --points N              (default 32)");
    eprintln!("  --block-size L          (default 8)");
    eprintln!("  --max-block-size L      (default 64)");
    eprintln!("  --moment-size M         (default N/4)");
    eprintln!("  --partitions P          (default 1)");
    eprintln!("  --real-matrices");
    eprintln!("  --delta D               (default 1e-12)");
    eprintln!("  --spurious-threshold T  (default 1e-4)");
    eprintln!("  --refine-inner N        (default 1)");
    eprintln!("  --refine-outer N        (default 1)");
    eprintln!("  --refine-blocksize N    (default 1)");
    eprintln!();
    eprintln!("cyclic-svd flags:");
    eprintln!("  --nsv N                 (default 1)");
    eprintln!("  --which largest|smallest (default largest)");
    eprintln!("  --tol T                 (default 1e-8)");
    eprintln!();
    eprintln!("matrix format: whitespace-separated values, one row per line");
}

fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>, String> {
    let text = std::fs::read_to_string(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse::<f64>).collect();
        rows.push(row.map_err(|err| format!("{}: {}", path.display(), err))?);
    }
    if rows.is_empty() {
        return Err(format!("{}: no data rows", path.display()));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(format!("{}: ragged rows", path.display()));
    }
    Ok(rows)
}

fn read_complex_matrix(path: &Path) -> Result<DMatrix<Complex64>, String> {
    let rows = read_rows(path)?;
    let (m, n) = (rows.len(), rows[0].len());
    let mut a = DMatrix::<Complex64>::zeros(m, n);
    for (r, row) in rows.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            a[(r, c)] = Complex64::new(v, 0.0);
        }
    }
    Ok(a)
}

fn read_real_matrix(path: &Path) -> Result<DMatrix<f64>, String> {
    let rows = read_rows(path)?;
    let (m, n) = (rows.len(), rows[0].len());
    let mut a = DMatrix::<f64>::zeros(m, n);
    for (r, row) in rows.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            a[(r, c)] = v;
        }
    }
    Ok(a)
}

/// Pulls `--flag value` pairs out of the remaining argument slice,
/// returning what's left after a boolean flag with no value.
struct ArgCursor<'a> {
    args: &'a [String],
    idx: usize,
}

impl<'a> ArgCursor<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { args, idx: 0 }
    }

    fn next_flag(&mut self) -> Option<&'a str> {
        let flag = self.args.get(self.idx)?;
        self.idx += 1;
        Some(flag.as_str())
    }

    fn next_value(&mut self, flag: &str) -> Result<&'a str, String> {
        let value = self.args.get(self.idx).ok_or_else(|| format!("{flag} requires a value"))?;
        self.idx += 1;
        Ok(value.as_str())
    }

    fn parse_value<T: std::str::FromStr>(&mut self, flag: &str) -> Result<T, String>
    where
        T::Err: std::fmt::Display,
    {
        self.next_value(flag)?
            .parse::<T>()
            .map_err(|err| format!("{flag}: {err}"))
    }
}

fn run_ciss(args: &[String]) -> Result<(), String> {
    if args.is_empty() {
        return Err("ciss requires a matrix file path".to_string());
    }
    let path = Path::new(&args[0]);
    let a = read_complex_matrix(path)?;
    let n = a.nrows();

    let mut center = Complex64::new(0.0, 0.0);
    let mut radius = 1.0f64;
    let mut vscale = 1.0f64;
    let mut config = CissConfig::default();

    let mut cursor = ArgCursor::new(&args[1..]);
    while let Some(flag) = cursor.next_flag() {
        match flag {
            "--region-center" => {
                let raw = cursor.next_value(flag)?;
                let (re, im) = raw
                    .split_once(',')
                    .ok_or_else(|| "--region-center expects RE,IM".to_string())?;
                center = Complex64::new(
                    re.parse().map_err(|e| format!("--region-center: {e}"))?,
                    im.parse().map_err(|e| format!("--region-center: {e}"))?,
                );
            }
            "--region-radius" => radius = cursor.parse_value(flag)?,
            "--region-vscale" => vscale = cursor.parse_value(flag)?,
            "--points" => config.points = cursor.parse_value(flag)?,
            "--block-size" => config.block_size = cursor.parse_value(flag)?,
            "--max-block-size" => config.max_block_size = cursor.parse_value(flag)?,
            "--moment-size" => config.moment_size = cursor.parse_value(flag)?,
            "--partitions" => config.partitions = cursor.parse_value(flag)?,
            "--real-matrices" => config.real_matrices = true,
            "--delta" => config.delta = cursor.parse_value(flag)?,
            "--spurious-threshold" => config.spurious_threshold = cursor.parse_value(flag)?,
            "--refine-inner" => config.refine_inner = cursor.parse_value(flag)?,
            "--refine-outer" => config.refine_outer = cursor.parse_value(flag)?,
            "--refine-blocksize" => config.refine_blocksize = cursor.parse_value(flag)?,
            other => return Err(format!("unrecognized flag: {other}")),
        }
    }

    let region = Region::new(center, radius, vscale);
    let mut solver = CissSolver::new(LocalMatrixHandle::dense(a), None, region, config);
    let mut rng = ChaChaRandomSource::from_seed(42);
    let result = solver.solve(&mut rng).map_err(|err| err.to_string())?;

    println!("n: {n}");
    println!("converged_reason: {:?}", result.converged_reason);
    println!("num_eigenvalues: {}", result.eigenvalues.len());
    for lambda in &result.eigenvalues {
        println!("{:.12e} {:+.12e}i", lambda.re, lambda.im);
    }
    Ok(())
}

fn run_cyclic_svd(args: &[String]) -> Result<(), String> {
    if args.is_empty() {
        return Err("cyclic-svd requires a matrix file path".to_string());
    }
    let path = Path::new(&args[0]);
    let a = read_real_matrix(path)?;

    let mut config = CyclicSvdConfig::default();
    let mut cursor = ArgCursor::new(&args[1..]);
    while let Some(flag) = cursor.next_flag() {
        match flag {
            "--nsv" => config.nsv = cursor.parse_value(flag)?,
            "--which" => {
                config.which = match cursor.next_value(flag)? {
                    "largest" => Which::Largest,
                    "smallest" => Which::Smallest,
                    other => return Err(format!("--which: unknown value {other}")),
                }
            }
            "--tol" => config.tol = cursor.parse_value(flag)?,
            other => return Err(format!("unrecognized flag: {other}")),
        }
    }

    let mut solver = CyclicSvd::new(LocalMatrixHandle::dense(a), None, config);
    let result = solver.solve().map_err(|err| err.to_string())?;

    println!("num_singular_values: {}", result.singular_values.len());
    for sigma in &result.singular_values {
        println!("{sigma:.12e}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--help") | Some("-h") | None => {
            usage();
            if args.is_empty() { ExitCode::from(2) } else { ExitCode::SUCCESS }
        }
        Some("ciss") => match run_ciss(&args[1..]) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("ciss error: {err}");
                ExitCode::from(1)
            }
        },
        Some("cyclic-svd") => match run_cyclic_svd(&args[1..]) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("cyclic-svd error: {err}");
                ExitCode::from(1)
            }
        },
        Some(other) => {
            eprintln!("unknown subcommand: {other}");
            usage();
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn unique_temp_file(prefix: &str) -> std::path::PathBuf {
        let pid = std::process::id();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}_{pid}_{nanos}.txt"))
    }

    #[test]
    fn read_rows_parses_whitespace_separated_values() {
        let path = unique_temp_file("sle_cli_rows");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "1.0 2.0 3.0").unwrap();
        writeln!(f, "4.0 5.0 6.0").unwrap();
        drop(f);

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn read_rows_rejects_ragged_input() {
        let path = unique_temp_file("sle_cli_ragged");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "1.0 2.0").unwrap();
        writeln!(f, "3.0").unwrap();
        drop(f);

        assert!(read_rows(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn arg_cursor_parses_typed_values() {
        let args = vec!["--points".to_string(), "64".to_string()];
        let mut cursor = ArgCursor::new(&args[1..]);
        let value: usize = cursor.parse_value("--points").unwrap();
        assert_eq!(value, 64);
    }
}
