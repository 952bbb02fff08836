use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

pub const UNCLUSTERED_ID: i32 = -1;

#[derive(Debug, Clone)]
pub struct Record {
    pub cluster_id: i32,
    pub name: String,
    /// Embedding coordinates (x2, y2, z2), absent when the row has none.
    pub position: Option<[f32; 3]>,
    /// (latitude, longitude), absent when the row has none.
    pub geo: Option<[f64; 2]>,
}

#[derive(Debug, Clone)]
pub struct Speaker {
    pub name: String,
    pub title: String,
    /// Fraction of the cluster's quotes, in [0, 1].
    pub share: f64,
}

/// One entry of the optional `<stem>.clusters.json` sidecar.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterMeta {
    pub cluster_id: i32,
    pub name: String,
    #[serde(default)]
    pub journals: Vec<String>,
    #[serde(default)]
    pub speakers: Vec<(String, String, f64)>,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_id: i32,
    pub name: String,
    /// Indices into `Dataset::records`, in input order.
    pub members: Vec<usize>,
    pub journals: Vec<String>,
    pub speakers: Vec<Speaker>,
}

#[derive(Debug, Clone)]
pub struct RowIssue {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub rows: usize,
    pub loaded: usize,
    pub issues: Vec<RowIssue>,
}

impl LoadReport {
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            format!("{} records", self.loaded)
        } else {
            format!(
                "{} records, {} of {} rows with issues",
                self.loaded,
                self.issues.len(),
                self.rows
            )
        }
    }
}

pub struct Dataset {
    pub records: Vec<Record>,
    pub clusters: Vec<Cluster>,
    pub cluster_count: usize,
    pub report: LoadReport,
}

impl Dataset {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("open: {}", path.display()))?;
        let (records, report) = parse_records(&text)?;

        let sidecar = path.with_extension("clusters.json");
        let metas: Vec<ClusterMeta> = if sidecar.is_file() {
            let json = fs::read_to_string(&sidecar)
                .with_context(|| format!("open: {}", sidecar.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("parse: {}", sidecar.display()))?
        } else {
            Vec::new()
        };

        let groups = group_by_cluster(&records);
        let cluster_count = cluster_count(&groups);
        let clusters = build_clusters(&records, &metas);

        Ok(Self {
            records,
            clusters,
            cluster_count,
            report,
        })
    }

    pub fn cluster(&self, cluster_id: i32) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    /// Flattened xyz for every record carrying a position, plus the cluster id
    /// of each emitted point.
    pub fn cloud_positions(&self) -> (Vec<f32>, Vec<i32>) {
        let mut positions = Vec::with_capacity(self.records.len() * 3);
        let mut point_clusters = Vec::with_capacity(self.records.len());
        for r in &self.records {
            if let Some(p) = r.position {
                positions.extend_from_slice(&p);
                point_clusters.push(r.cluster_id);
            }
        }
        (positions, point_clusters)
    }

    /// Center and normalization scale that map the cloud into roughly
    /// [-1, 1] around the origin.
    pub fn cloud_transform(&self) -> ([f32; 3], f32) {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        let mut any = false;
        for r in &self.records {
            if let Some(p) = r.position {
                any = true;
                for k in 0..3 {
                    min[k] = min[k].min(p[k]);
                    max[k] = max[k].max(p[k]);
                }
            }
        }
        if !any {
            return ([0.0; 3], 1.0);
        }
        let center = [
            0.5 * (min[0] + max[0]),
            0.5 * (min[1] + max[1]),
            0.5 * (min[2] + max[2]),
        ];
        let extent = (max[0] - min[0])
            .max(max[1] - min[1])
            .max(max[2] - min[2])
            .max(1e-6);
        (center, 2.0 / extent)
    }

    /// [min_lat, min_lon, max_lat, max_lon] over records with geo coordinates.
    pub fn geo_bounds(&self) -> Option<[f64; 4]> {
        let mut out: Option<[f64; 4]> = None;
        for r in &self.records {
            if let Some([lat, lon]) = r.geo {
                let b = out.get_or_insert([lat, lon, lat, lon]);
                b[0] = b[0].min(lat);
                b[1] = b[1].min(lon);
                b[2] = b[2].max(lat);
                b[3] = b[3].max(lon);
            }
        }
        out
    }
}

/// Stable grouping: keys are the raw cluster ids (sentinel included), values
/// are record indices in input order.
pub fn group_by_cluster(records: &[Record]) -> BTreeMap<i32, Vec<usize>> {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        groups.entry(r.cluster_id).or_default().push(i);
    }
    groups
}

/// Number of distinct non-sentinel clusters, the denominator for colormap
/// normalization.
pub fn cluster_count(groups: &BTreeMap<i32, Vec<usize>>) -> usize {
    groups.keys().filter(|id| **id >= 0).count()
}

/// Join groups with sidecar metadata. Output order: ascending cluster id,
/// sentinel group last.
pub fn build_clusters(records: &[Record], metas: &[ClusterMeta]) -> Vec<Cluster> {
    let groups = group_by_cluster(records);
    let mut ids: Vec<i32> = groups.keys().copied().filter(|id| *id >= 0).collect();
    if groups.contains_key(&UNCLUSTERED_ID) {
        ids.push(UNCLUSTERED_ID);
    }

    ids.into_iter()
        .map(|id| {
            let meta = metas.iter().find(|m| m.cluster_id == id);
            let name = meta
                .map(|m| m.name.clone())
                .unwrap_or_else(|| default_cluster_name(id));
            let journals = meta.map(|m| m.journals.clone()).unwrap_or_default();
            let speakers = meta
                .map(|m| {
                    m.speakers
                        .iter()
                        .map(|(name, title, share)| Speaker {
                            name: name.clone(),
                            title: title.clone(),
                            share: *share,
                        })
                        .collect()
                })
                .unwrap_or_default();
            Cluster {
                cluster_id: id,
                name,
                members: groups[&id].clone(),
                journals,
                speakers,
            }
        })
        .collect()
}

pub fn default_cluster_name(cluster_id: i32) -> String {
    if cluster_id < 0 {
        "Unclustered".to_string()
    } else {
        format!("Cluster {cluster_id}")
    }
}

/// Parse the record CSV. Header: journal,cluster_id,x2,y2,z2,lat,lon with the
/// spatial triple and geo pair optional per row. Malformed numerics skip the
/// row with an issue; a half-present optional group keeps the record and
/// records an issue; fully empty optional cells are just None.
pub fn parse_records(text: &str) -> anyhow::Result<(Vec<Record>, LoadReport)> {
    let mut lines = text.lines().enumerate();
    let (_, header) = lines
        .by_ref()
        .find(|(_, l)| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("empty input"))?;

    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let col = |name: &str| columns.iter().position(|c| c.eq_ignore_ascii_case(name));

    let journal_col = col("journal").ok_or_else(|| anyhow!("missing column: journal"))?;
    let cluster_col = col("cluster_id").ok_or_else(|| anyhow!("missing column: cluster_id"))?;
    let pos_cols = [col("x2"), col("y2"), col("z2")];
    let geo_cols = [col("lat"), col("lon")];

    let mut records = Vec::new();
    let mut report = LoadReport::default();

    for (idx, raw) in lines {
        if raw.trim().is_empty() {
            continue;
        }
        let line = idx + 1;
        report.rows += 1;
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        let cell = |i: Option<usize>| -> Option<&str> {
            i.and_then(|i| parts.get(i)).copied().filter(|s| !s.is_empty())
        };

        let Some(name) = cell(Some(journal_col)) else {
            report.issues.push(RowIssue {
                line,
                reason: "missing journal".to_string(),
            });
            continue;
        };
        // cluster_id arrives as a float in some exports; round like the rest
        // of the pipeline expects.
        let cluster_id = match cell(Some(cluster_col)).map(str::parse::<f64>) {
            Some(Ok(v)) if v.is_finite() => v.round() as i32,
            _ => {
                report.issues.push(RowIssue {
                    line,
                    reason: "bad cluster_id".to_string(),
                });
                continue;
            }
        };

        let pos_cells = [cell(pos_cols[0]), cell(pos_cols[1]), cell(pos_cols[2])];
        let geo_cells = [cell(geo_cols[0]), cell(geo_cols[1])];
        let (position, pos_issue) = parse_group(pos_cells, "spatial coordinates");
        let (geo, geo_issue) = parse_group(geo_cells, "geo coordinates");
        let mut fatal = false;
        for reason in [pos_issue, geo_issue].into_iter().flatten() {
            fatal |= reason.starts_with("bad");
            report.issues.push(RowIssue { line, reason });
        }
        if fatal {
            continue;
        }

        records.push(Record {
            cluster_id,
            name: name.to_string(),
            position: position.map(|v| [v[0] as f32, v[1] as f32, v[2] as f32]),
            geo: geo.map(|v| [v[0], v[1]]),
        });
        report.loaded += 1;
    }

    Ok((records, report))
}

/// Parse an all-or-nothing group of optional numeric cells. Returns the
/// values when every cell is present and finite, plus an issue reason when
/// the group is malformed ("bad ...", row-fatal) or only partially present
/// ("incomplete ...", field dropped).
fn parse_group<const N: usize>(
    cells: [Option<&str>; N],
    what: &str,
) -> (Option<[f64; N]>, Option<String>) {
    let present = cells.iter().filter(|c| c.is_some()).count();
    if present == 0 {
        return (None, None);
    }
    if present < N {
        return (None, Some(format!("incomplete {what}")));
    }
    let mut out = [0.0f64; N];
    for (slot, cell) in out.iter_mut().zip(&cells) {
        match cell.unwrap().parse::<f64>() {
            Ok(v) if v.is_finite() => *slot = v,
            _ => return (None, Some(format!("bad {what}"))),
        }
    }
    (Some(out), None)
}

const DEMO_CITIES: [(&str, f64, f64); 10] = [
    ("Lausanne", 46.5197, 6.6323),
    ("Genève", 46.2044, 6.1432),
    ("Fribourg", 46.8065, 7.1619),
    ("Neuchâtel", 46.9900, 6.9293),
    ("Sion", 46.2331, 7.3606),
    ("Berne", 46.9480, 7.4474),
    ("Bienne", 47.1368, 7.2468),
    ("Yverdon", 46.7785, 6.6412),
    ("Montreux", 46.4312, 6.9107),
    ("Delémont", 47.3647, 7.3446),
];

const DEMO_PREFIXES: [&str; 5] = [
    "Gazette de",
    "Courrier de",
    "Journal de",
    "Feuille d'Avis de",
    "Tribune de",
];

const DEMO_TOPICS: [&str; 6] = [
    "Politique fédérale",
    "Vie locale",
    "Économie et commerce",
    "Culture et spectacles",
    "Faits divers",
    "Sport",
];

const DEMO_SPEAKERS: [(&str, &str); 8] = [
    ("Henri Vallotton", "conseiller national"),
    ("Marguerite Perret", "rédactrice en chef"),
    ("Ernest Chuard", "conseiller fédéral"),
    ("Louise Favre", "présidente de société"),
    ("Paul Maillefer", "syndic de Lausanne"),
    ("Jeanne Montandon", "institutrice"),
    ("Gustave Ador", "ancien président"),
    ("Albert Rosset", "correspondant"),
];

/// Build a small synthetic dataset (CSV + sidecar JSON) so the app is usable
/// without external data. Roughly one record in seven has no geo pair and one
/// in ten is unclustered, to exercise both skip paths.
pub fn demo_dataset_strings(rng: &mut impl rand::Rng) -> (String, String) {
    let n_clusters = 5usize;
    let n_records = 60usize;

    let mut csv = String::from("journal,cluster_id,x2,y2,z2,lat,lon\n");
    for i in 0..n_records {
        let unclustered = rng.random_range(0..10) == 0;
        let cluster = if unclustered {
            UNCLUSTERED_ID
        } else {
            (i % n_clusters) as i32
        };
        let (city, lat, lon) = DEMO_CITIES[rng.random_range(0..DEMO_CITIES.len())];
        let prefix = DEMO_PREFIXES[i % DEMO_PREFIXES.len()];

        // Cluster blobs on a ring, unclustered scattered around the origin.
        let (cx, cy, cz) = if unclustered {
            (0.0, 0.0, 0.0)
        } else {
            let a = cluster as f64 / n_clusters as f64 * std::f64::consts::TAU;
            (3.0 * a.cos(), 3.0 * a.sin(), (cluster as f64) * 0.5 - 1.0)
        };
        let x = cx + rng.random_range(-0.8..0.8);
        let y = cy + rng.random_range(-0.8..0.8);
        let z = cz + rng.random_range(-0.8..0.8);

        let has_geo = rng.random_range(0..7) != 0;
        let (lat_s, lon_s) = if has_geo {
            (
                format!("{:.4}", lat + rng.random_range(-0.05..0.05)),
                format!("{:.4}", lon + rng.random_range(-0.05..0.05)),
            )
        } else {
            (String::new(), String::new())
        };

        let _ = writeln!(
            csv,
            "{prefix} {city},{cluster},{x:.4},{y:.4},{z:.4},{lat_s},{lon_s}"
        );
    }

    let mut sidecar = String::from("[\n");
    for c in 0..n_clusters {
        let topic = DEMO_TOPICS[c % DEMO_TOPICS.len()];
        let mut journals = String::new();
        for k in 0..3 {
            let (city, _, _) = DEMO_CITIES[(c * 3 + k) % DEMO_CITIES.len()];
            let prefix = DEMO_PREFIXES[(c + k) % DEMO_PREFIXES.len()];
            if k > 0 {
                journals.push_str(", ");
            }
            let _ = write!(journals, "\"{prefix} {city}\"");
        }
        let mut speakers = String::new();
        let mut share = rng.random_range(0.2..0.4);
        for k in 0..3 {
            let (name, title) = DEMO_SPEAKERS[(c * 2 + k) % DEMO_SPEAKERS.len()];
            if k > 0 {
                speakers.push_str(", ");
            }
            let _ = write!(speakers, "[\"{name}\", \"{title}\", {share:.4}]");
            share *= rng.random_range(0.4..0.8);
        }
        let _ = write!(
            sidecar,
            "  {{ \"cluster_id\": {c}, \"name\": \"{topic}\", \"journals\": [{journals}], \"speakers\": [{speakers}] }}"
        );
        sidecar.push_str(if c + 1 < n_clusters { ",\n" } else { "\n" });
    }
    sidecar.push_str("]\n");

    (csv, sidecar)
}

/// Write the demo pair next to each other and return the CSV path.
pub fn write_demo_dataset(dir: &Path, rng: &mut impl rand::Rng) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create: {}", dir.display()))?;
    let (csv, sidecar) = demo_dataset_strings(rng);
    let csv_path = dir.join("demo.csv");
    let sidecar_path = dir.join("demo.clusters.json");
    fs::write(&csv_path, csv).with_context(|| format!("write: {}", csv_path.display()))?;
    fs::write(&sidecar_path, sidecar)
        .with_context(|| format!("write: {}", sidecar_path.display()))?;
    Ok(csv_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(cluster_id: i32) -> Record {
        Record {
            cluster_id,
            name: format!("r{cluster_id}"),
            position: None,
            geo: None,
        }
    }

    #[test]
    fn grouping_is_stable_and_counts_exclude_sentinel() {
        let records = vec![rec(2), rec(-1), rec(2)];
        let groups = group_by_cluster(&records);
        assert_eq!(groups[&2], vec![0, 2]);
        assert_eq!(groups[&-1], vec![1]);
        assert_eq!(cluster_count(&groups), 1);
    }

    #[test]
    fn empty_input_groups_to_nothing() {
        let groups = group_by_cluster(&[]);
        assert!(groups.is_empty());
        assert_eq!(cluster_count(&groups), 0);
    }

    #[test]
    fn parses_full_and_partial_rows() {
        let text = "journal,cluster_id,x2,y2,z2,lat,lon\n\
                    Gazette,0,1.0,2.0,3.0,46.5,6.6\n\
                    Courrier,1,, , ,,\n";
        let (records, report) = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].position, Some([1.0, 2.0, 3.0]));
        assert_eq!(records[0].geo, Some([46.5, 6.6]));
        assert_eq!(records[1].position, None);
        assert_eq!(records[1].geo, None);
        assert!(report.issues.is_empty());
        assert_eq!(report.loaded, 2);
    }

    #[test]
    fn cluster_id_float_rounds_to_integer() {
        let text = "journal,cluster_id\nGazette,2.0\nCourrier,-1.0\n";
        let (records, _) = parse_records(text).unwrap();
        assert_eq!(records[0].cluster_id, 2);
        assert_eq!(records[1].cluster_id, -1);
    }

    #[test]
    fn malformed_numeric_skips_row_with_issue() {
        let text = "journal,cluster_id,x2,y2,z2\nGazette,0,1.0,oops,3.0\nCourrier,1,1,2,3\n";
        let (records, report) = parse_records(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Courrier");
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].reason.contains("spatial"));
        assert_eq!(report.issues[0].line, 2);
    }

    #[test]
    fn half_geo_pair_keeps_record_without_geo() {
        let text = "journal,cluster_id,lat,lon\nGazette,0,46.5,\n";
        let (records, report) = parse_records(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].geo, None);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].reason.contains("incomplete"));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        assert!(parse_records("journal,x2\nGazette,1.0\n").is_err());
        assert!(parse_records("").is_err());
    }

    #[test]
    fn clusters_ordered_ascending_with_sentinel_last() {
        let records = vec![rec(3), rec(-1), rec(0), rec(3)];
        let clusters = build_clusters(&records, &[]);
        let ids: Vec<i32> = clusters.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![0, 3, -1]);
        assert_eq!(clusters[1].members, vec![0, 3]);
        assert_eq!(clusters[2].name, "Unclustered");
    }

    #[test]
    fn sidecar_metadata_joins_by_id() {
        let records = vec![rec(0), rec(1)];
        let metas = vec![ClusterMeta {
            cluster_id: 1,
            name: "Politique".to_string(),
            journals: vec!["A".to_string()],
            speakers: vec![("X".to_string(), "Y".to_string(), 0.5)],
        }];
        let clusters = build_clusters(&records, &metas);
        assert_eq!(clusters[0].name, "Cluster 0");
        assert_eq!(clusters[1].name, "Politique");
        assert_eq!(clusters[1].speakers[0].share, 0.5);
    }

    #[test]
    fn cloud_positions_skip_missing_and_track_clusters() {
        let mut a = rec(0);
        a.position = Some([1.0, 2.0, 3.0]);
        let b = rec(1);
        let mut c = rec(-1);
        c.position = Some([4.0, 5.0, 6.0]);
        let ds = Dataset {
            records: vec![a, b, c],
            clusters: Vec::new(),
            cluster_count: 2,
            report: LoadReport::default(),
        };
        let (positions, point_clusters) = ds.cloud_positions();
        assert_eq!(positions, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(point_clusters, vec![0, -1]);
    }

    #[test]
    fn demo_dataset_parses_cleanly() {
        let mut rng = rand::rng();
        let (csv, sidecar) = demo_dataset_strings(&mut rng);
        let (records, report) = parse_records(&csv).unwrap();
        assert!(!records.is_empty());
        assert!(report.issues.is_empty());
        let metas: Vec<ClusterMeta> = serde_json::from_str(&sidecar).unwrap();
        assert_eq!(metas.len(), 5);
        let clusters = build_clusters(&records, &metas);
        assert!(clusters.iter().any(|c| !c.speakers.is_empty()));
    }
}
