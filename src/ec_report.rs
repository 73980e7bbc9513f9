// Cross-run aggregation and rendering of simulation results

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::ec_interface::{Bytes, Seconds, MB};
use crate::ec_simulator::{RunResult, StepRecord};

/// Mean of every record sharing one exit percentage
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub exit_percentage: f64,
    pub remaining_nodes: f64,
    pub total_storage_overhead: Bytes,
    pub total_repair_bandwidth: Bytes,
    pub write_latency: Seconds,
    pub max_recovery_level: f64,
    pub avg_recovery_latency: Seconds,
    pub avg_node_storage_bytes: Bytes,
}

impl ReportRow {
    fn zero(exit_percentage: f64) -> Self {
        Self {
            exit_percentage,
            remaining_nodes: 0.0,
            total_storage_overhead: 0.0,
            total_repair_bandwidth: 0.0,
            write_latency: 0.0,
            max_recovery_level: 0.0,
            avg_recovery_latency: 0.0,
            avg_node_storage_bytes: 0.0,
        }
    }

    fn add(&mut self, record: &StepRecord, recovery_latency: Seconds) {
        self.remaining_nodes += record.remaining_nodes as f64;
        self.total_storage_overhead += record.total_storage_overhead;
        self.total_repair_bandwidth += record.total_repair_bandwidth;
        self.write_latency += record.write_latency;
        self.max_recovery_level += record.max_recovery_level as f64;
        self.avg_recovery_latency += recovery_latency;
        self.avg_node_storage_bytes += record.avg_node_storage_bytes;
    }

    fn scale(&mut self, count: usize) {
        let n = count as f64;
        self.remaining_nodes /= n;
        self.total_storage_overhead /= n;
        self.total_repair_bandwidth /= n;
        self.write_latency /= n;
        self.max_recovery_level /= n;
        self.avg_recovery_latency /= n;
        self.avg_node_storage_bytes /= n;
    }
}

/// Results averaged over all runs, grouped by exit percentage
#[derive(Debug, Clone)]
pub struct Report {
    pub runs: usize,
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Average records with equal exit percentage across runs.
    ///
    /// An infinite recovery latency makes its group mean infinite unless
    /// `unrecoverable_latency` supplies a finite stand-in.
    pub fn aggregate(runs: &[RunResult], unrecoverable_latency: Option<Seconds>) -> Self {
        let mut groups: Vec<(ReportRow, usize)> = Vec::new();

        for record in runs.iter().flat_map(|run| run.records.iter()) {
            let latency = match unrecoverable_latency {
                Some(stand_in) if record.avg_recovery_latency.is_infinite() => stand_in,
                _ => record.avg_recovery_latency,
            };

            let index = match groups
                .iter()
                .position(|(row, _)| row.exit_percentage == record.exit_percentage)
            {
                Some(index) => index,
                None => {
                    groups.push((ReportRow::zero(record.exit_percentage), 0));
                    groups.len() - 1
                }
            };
            let (row, count) = &mut groups[index];
            row.add(record, latency);
            *count += 1;
        }

        let mut rows: Vec<ReportRow> = groups
            .into_iter()
            .map(|(mut row, count)| {
                row.scale(count);
                row
            })
            .collect();
        rows.sort_by(|a, b| a.exit_percentage.total_cmp(&b.exit_percentage));

        Self {
            runs: runs.len(),
            rows,
        }
    }

    /// Labeled lists, one per metric
    pub fn render(&self) -> String {
        fn list<I: IntoIterator<Item = f64>>(values: I) -> String {
            let items: Vec<String> = values.into_iter().map(|v| format!("{:.4}", v)).collect();
            format!("[{}]", items.join(", "))
        }

        let mut out = String::new();
        if self.rows.is_empty() {
            out.push_str("No simulation results to report.\n");
            return out;
        }

        let rows = &self.rows;
        let exits: Vec<String> = rows
            .iter()
            .map(|r| format!("{}", (r.exit_percentage * 100.0).round() as i64))
            .collect();
        let levels: Vec<String> = rows
            .iter()
            .map(|r| format!("{}", r.max_recovery_level as i64))
            .collect();
        let remaining: Vec<String> = rows
            .iter()
            .map(|r| format!("{}", r.remaining_nodes as i64))
            .collect();

        let _ = writeln!(out, "exit_percentage = [{}]", exits.join(", "));
        let _ = writeln!(
            out,
            "bft_ec_recovery_latency_s = {}",
            list(rows.iter().map(|r| r.avg_recovery_latency))
        );
        let _ = writeln!(
            out,
            "bft_ec_storage_overhead_mb = {}",
            list(rows.iter().map(|r| r.total_storage_overhead / MB))
        );
        let _ = writeln!(
            out,
            "bft_ec_repair_bandwidth_mb = {}",
            list(rows.iter().map(|r| r.total_repair_bandwidth / MB))
        );
        let _ = writeln!(
            out,
            "bft_ec_initial_write_latency_s = {}",
            list([rows[0].write_latency])
        );
        let _ = writeln!(
            out,
            "bft_ec_repair_latency_per_node_s = {}",
            list(rows[1..].iter().map(|r| r.write_latency))
        );
        let _ = writeln!(
            out,
            "bft_ec_node_storage_mb = {}",
            list(rows.iter().map(|r| r.avg_node_storage_bytes / MB))
        );
        let _ = writeln!(out, "remaining_nodes = [{}]", remaining.join(", "));
        let _ = writeln!(out, "max_recovery_level = [{}]", levels.join(", "));
        out
    }

    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║        BFT-EC Simulation Results                       ║");
        println!("╚════════════════════════════════════════════════════════╝\n");
        println!("Averaged over {} runs\n", self.runs);
        print!("{}", self.render());
    }

    /// One header line plus one row per exit percentage
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "exit_percentage,remaining_nodes,storage_overhead_bytes,repair_bandwidth_bytes,write_latency_s,max_recovery_level,avg_recovery_latency_s,avg_node_storage_bytes"
        )?;
        for r in &self.rows {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{}",
                r.exit_percentage,
                r.remaining_nodes,
                r.total_storage_overhead,
                r.total_repair_bandwidth,
                r.write_latency,
                r.max_recovery_level,
                r.avg_recovery_latency,
                r.avg_node_storage_bytes
            )?;
        }

        writer.flush()
    }
}
