use flate2::Compression;
use flate2::write::GzEncoder;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use smap_rs::nucleotide::Nucleotide;
use smap_rs::tree::Outgroup;
use smap_rs::{AccumulateOptions, WindowAccumulator};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before unix epoch")
        .as_nanos();
    path.push(format!("{prefix}_{}_{}", std::process::id(), nanos));
    path
}

fn approx_eq(a: f64, b: f64, eps: f64) {
    assert!(
        (a - b).abs() <= eps,
        "expected {a} ~= {b} within eps={eps}, got diff={}",
        (a - b).abs()
    );
}

fn records(topologies: &[&str]) -> String {
    let mut content = String::new();
    for t in topologies {
        content.push_str(t);
        content.push('\n');
        content.push_str(t);
        content.push_str("\n\n");
    }
    content
}

/// Write `{dir}/site_{site}.map` with one record per topology.
fn write_site(dir: &Path, site: usize, topologies: &[&str]) {
    fs::write(dir.join(format!("site_{site}.map")), records(topologies))
        .expect("failed to write mapping file");
}

fn write_site_gz(dir: &Path, site: usize, topologies: &[&str]) {
    let file = fs::File::create(dir.join(format!("site_{site}.map.gz")))
        .expect("failed to create gzip mapping file");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(records(topologies).as_bytes())
        .expect("failed to write gzip mapping file");
    encoder.finish().expect("failed to finish gzip stream");
}

fn prefix(dir: &Path) -> String {
    dir.join("site").to_string_lossy().into_owned()
}

fn accumulator(dir: &Path, n_draws: usize, strict: bool) -> WindowAccumulator {
    WindowAccumulator::new(
        prefix(dir),
        Outgroup::new(["a"]),
        n_draws,
        AccumulateOptions {
            strict,
            progress: false,
        },
    )
    .expect("valid accumulator")
}

const FLAT_A: &str = "(a_A:1.0,b_A:1.0)A;";

#[test]
fn single_window_counts_middle_changes() {
    let dir = unique_temp_path("smap_single_window");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A]);
    write_site(&dir, 2, &["(a_G:0.25:C:0.25:G:0.5,b_G:1.0)G;"]);
    write_site(&dir, 3, &[FLAT_A]);

    let acc = accumulator(&dir, 1, false).accumulate(1, 3).expect("scan failed");
    assert_eq!(acc.n_windows, 1);
    assert_eq!(acc.n_skipped(), 0);

    let raw = &acc.raw;
    assert_eq!(raw.counts.dim(), (2, 18, 1));
    assert_eq!(raw.counts[(0, 0, 0)], 1, "G->C on branch a");
    assert_eq!(raw.counts[(0, 1, 0)], 1, "C->G on branch a");
    assert_eq!(raw.counts.sum(), 2);

    approx_eq(raw.proportions[(0, 0, 0)], 0.75, 1e-12);
    approx_eq(raw.proportions[(0, 1, 0)], 0.25, 1e-12);
    approx_eq(raw.proportions[(1, 0, 0)], 1.0, 1e-12);
    for j in 0..2 {
        let total: f64 = (0..6).map(|s| raw.proportions[(j, s, 0)]).sum();
        approx_eq(total, 1.0, 1e-12);
    }

    assert_eq!(acc.root.counts[(Nucleotide::G.index(), 0)], 1);
    assert_eq!(acc.root.total(0), 1);
    approx_eq(raw.branch_lengths[0], 1.0, 1e-12);
    approx_eq(raw.branch_lengths[1], 1.0, 1e-12);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn cpg_context_comes_from_neighbouring_sites() {
    let dir = unique_temp_path("smap_cpg_window");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A]);
    write_site(&dir, 2, &["(a_C:1.0,b_T:0.5:T:0.5)C;"]);
    write_site(&dir, 3, &["(a_G:1.0,b_G:1.0)G;"]);

    let acc = accumulator(&dir, 1, false).accumulate(1, 3).expect("scan failed");
    let raw = &acc.raw;
    assert_eq!(raw.counts[(1, 17, 0)], 1, "CpG C->T on branch b");
    assert_eq!(raw.counts.sum(), 1);
    approx_eq(raw.proportions[(0, 5, 0)], 1.0, 1e-12);
    approx_eq(raw.proportions[(1, 5, 0)], 0.5, 1e-12);
    approx_eq(raw.proportions[(1, 2, 0)], 0.5, 1e-12);
    assert_eq!(acc.root.counts[(Nucleotide::C.index(), 0)], 1);

    let _ = fs::remove_dir_all(dir);
}

const STATES: [Nucleotide; 4] = Nucleotide::ALL;

/// Random history from `from` over a unit-length branch: `(text, end state, changes)`.
fn random_branch(rng: &mut SmallRng, from: Nucleotide) -> (String, Nucleotide, usize) {
    let n_changes = rng.gen_range(0..4usize);
    let dwell = 1.0 / (n_changes + 1) as f64;
    let mut text = format!(":{dwell}");
    let mut state = from;
    for _ in 0..n_changes {
        let mut next = STATES[rng.gen_range(0..4)];
        while next == state {
            next = STATES[rng.gen_range(0..4)];
        }
        state = next;
        text.push_str(&format!(":{state}:{dwell}"));
    }
    (text, state, n_changes)
}

/// Random mapping of `((a,b),c)` and its total number of changes.
fn random_tree(rng: &mut SmallRng) -> (String, usize) {
    let root = STATES[rng.gen_range(0..4)];
    let (h_ab, s_ab, n_ab) = random_branch(rng, root);
    let (h_a, s_a, n_a) = random_branch(rng, s_ab);
    let (h_b, s_b, n_b) = random_branch(rng, s_ab);
    let (h_c, s_c, n_c) = random_branch(rng, root);
    let tree = format!("((a_{s_a}{h_a},b_{s_b}{h_b}){s_ab}{h_ab},c_{s_c}{h_c}){root};");
    (tree, n_ab + n_a + n_b + n_c)
}

#[test]
fn every_middle_change_is_counted_once() {
    let dir = unique_temp_path("smap_random_scan");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    let mut rng = SmallRng::seed_from_u64(20240917);
    let n_sites = 6;
    let n_draws = 3;

    let mut changes = vec![vec![0usize; n_draws]; n_sites + 1];
    for site in 1..=n_sites {
        let mut trees = Vec::with_capacity(n_draws);
        for c in 0..n_draws {
            let (tree, n) = random_tree(&mut rng);
            changes[site][c] = n;
            trees.push(tree);
        }
        let refs: Vec<&str> = trees.iter().map(String::as_str).collect();
        write_site(&dir, site, &refs);
    }

    let acc = accumulator(&dir, n_draws, true)
        .accumulate(1, n_sites)
        .expect("scan failed");
    assert_eq!(acc.n_windows, n_sites - 2);
    assert_eq!(acc.raw.n_branches(), 4);

    let per_branch = acc.raw.changes_per_branch();
    for c in 0..n_draws {
        let expected: usize = (2..n_sites).map(|site| changes[site][c]).sum();
        let counted: u32 = per_branch.column(c).sum();
        assert_eq!(counted as usize, expected, "draw {c}");
        assert_eq!(acc.root.total(c) as usize, acc.n_windows);
        for j in 0..4 {
            let total: f64 = (0..6).map(|s| acc.raw.proportions[(j, s, c)]).sum();
            approx_eq(total, acc.n_windows as f64, 1e-9);
        }
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unusable_records_are_skipped_unless_strict() {
    let dir = unique_temp_path("smap_skip_scan");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A, FLAT_A, FLAT_A]);
    // draw 2 ends in the wrong state, draw 3 is missing
    write_site(&dir, 2, &["(a_G:1.0,b_G:1.0)G;", "(a_G:1.0,b_C:1.0)G;"]);
    write_site(&dir, 3, &[FLAT_A, FLAT_A, FLAT_A]);

    let acc = accumulator(&dir, 3, false).accumulate(1, 3).expect("lenient scan failed");
    assert_eq!(acc.skipped, vec![0, 1, 1]);
    assert_eq!(acc.root.total(0), 1);
    assert_eq!(acc.root.total(1), 0);
    assert_eq!(acc.root.total(2), 0);

    let err = accumulator(&dir, 3, true)
        .accumulate(1, 3)
        .expect_err("strict scan should fail");
    assert!(format!("{err:#}").contains("draw 2"), "unexpected error: {err:#}");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_site_file_is_an_error() {
    let dir = unique_temp_path("smap_missing_site");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A]);
    write_site(&dir, 2, &[FLAT_A]);

    assert!(accumulator(&dir, 1, false).accumulate(1, 3).is_err());
    assert!(accumulator(&dir, 1, false).accumulate(1, 2).is_err());
    assert!(accumulator(&dir, 1, false).accumulate(0, 2).is_err());
    assert!(accumulator(&dir, 1, false).accumulate(usize::MAX, 5).is_err());

    let _ = fs::remove_dir_all(dir);
}

const ROOT_G: &str = "(a_G:1.0,b_G:1.0)G;";
const ROOT_C: &str = "(a_C:1.0,b_C:1.0)C;";
const ROOT_T: &str = "(a_T:1.0,b_T:1.0)T;";

#[test]
fn bad_record_does_not_shift_later_draws() {
    let dir = unique_temp_path("smap_bad_record");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A, FLAT_A, FLAT_A]);
    let middle = format!("{}\nstray draft\n\n{}", records(&[ROOT_G]), records(&[ROOT_T]));
    fs::write(dir.join("site_2.map"), middle).expect("failed to write mapping file");
    write_site(&dir, 3, &[FLAT_A, FLAT_A, FLAT_A]);

    let acc = accumulator(&dir, 3, false).accumulate(1, 3).expect("lenient scan failed");
    assert_eq!(acc.skipped, vec![0, 1, 0]);
    assert_eq!(acc.root.counts[(Nucleotide::G.index(), 0)], 1);
    assert_eq!(acc.root.total(1), 0);
    assert_eq!(acc.root.counts[(Nucleotide::T.index(), 2)], 1);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn stray_blank_line_never_moves_a_tree_to_another_draw() {
    let dir = unique_temp_path("smap_stray_blank");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A, FLAT_A, FLAT_A]);
    let middle = format!(
        "{}\n{}{}",
        records(&[ROOT_G]),
        records(&[ROOT_C]),
        records(&[ROOT_T])
    );
    fs::write(dir.join("site_2.map"), middle).expect("failed to write mapping file");
    write_site(&dir, 3, &[FLAT_A, FLAT_A, FLAT_A]);

    let acc = accumulator(&dir, 3, false).accumulate(1, 3).expect("lenient scan failed");
    assert_eq!(acc.root.counts[(Nucleotide::G.index(), 0)], 1);
    assert_eq!(acc.root.counts[(Nucleotide::C.index(), 2)], 0);
    for c in 1..3 {
        assert_eq!(acc.skipped[c] as u32 + acc.root.total(c), 1, "draw {c}");
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn gzip_site_files_are_read_when_plain_ones_are_absent() {
    let dir = unique_temp_path("smap_gzip_scan");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site_gz(&dir, 1, &[FLAT_A]);
    write_site_gz(&dir, 2, &["(a_G:0.25:C:0.25:G:0.5,b_G:1.0)G;"]);
    write_site_gz(&dir, 3, &[FLAT_A]);

    let acc = accumulator(&dir, 1, true).accumulate(1, 3).expect("scan failed");
    assert_eq!(acc.n_skipped(), 0);
    assert_eq!(acc.raw.counts[(0, 0, 0)], 1);
    assert_eq!(acc.raw.counts[(0, 1, 0)], 1);
    assert_eq!(acc.raw.counts.sum(), 2);
    assert_eq!(acc.root.counts[(Nucleotide::G.index(), 0)], 1);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn plain_site_file_wins_over_gzip() {
    let dir = unique_temp_path("smap_plain_wins");
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    write_site(&dir, 1, &[FLAT_A]);
    write_site(&dir, 2, &[ROOT_G]);
    write_site_gz(&dir, 2, &[ROOT_C]);
    write_site(&dir, 3, &[FLAT_A]);

    let acc = accumulator(&dir, 1, true).accumulate(1, 3).expect("scan failed");
    assert_eq!(acc.root.counts[(Nucleotide::G.index(), 0)], 1);
    assert_eq!(acc.root.counts[(Nucleotide::C.index(), 0)], 0);

    let _ = fs::remove_dir_all(dir);
}
