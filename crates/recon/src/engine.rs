use tracing::{debug, info, warn};

use crate::compare::{compare, is_blank};
use crate::config::EngineConfig;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::matcher::{join_key, resolve_reference_key, SourceIndex, SourceMatch};
use crate::model::{EvidenceCell, EvidenceToken, ReconMeta, ReconResult, RowOutcome, RowStatus};
use crate::registry::{DocumentMapping, FieldMapping, FieldSpec, Registry, SpecialRule};
use crate::rules::{disbursement_window, full_name_tokens, RateCheck};
use crate::table::{ColumnIndex, RecordView, Table};

/// Run reconciliation of `reference` against `source`. Returns per-row evidence + summary.
pub fn run(
    registry: &Registry,
    config: &EngineConfig,
    reference: &Table,
    source: &Table,
) -> Result<ReconResult, ReconError> {
    Reconciler::new(registry, config).run(reference, source)
}

/// Evaluates every reference row against its source row.
///
/// Holds only shared references; one value may serve any number of runs.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
}

/// Read-only lookups prepared once per run.
struct RunContext<'t> {
    reference: &'t Table,
    source: &'t Table,
    reference_columns: ColumnIndex,
    source_columns: ColumnIndex,
    reference_key: usize,
    source_index: SourceIndex,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a Registry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn run(&self, reference: &Table, source: &Table) -> Result<ReconResult, ReconError> {
        let reference_key = resolve_reference_key(reference.headers(), &self.registry.reference)
            .ok_or_else(|| ReconError::MissingKeyColumn {
                table: "reference".into(),
                column: self.reference_key_description(),
            })?;

        let source_columns = ColumnIndex::new(source.headers());
        let source_key = source_columns
            .get(&self.registry.source.key_column)
            .ok_or_else(|| ReconError::MissingKeyColumn {
                table: "source".into(),
                column: self.registry.source.key_column.clone(),
            })?;

        let source_index = SourceIndex::build(source, source_key);
        if source_index.duplicate_keys() > 0 {
            warn!(
                keys = source_index.duplicate_keys(),
                policy = %self.config.duplicate_policy,
                "source table has duplicate operation keys"
            );
        }

        let ctx = RunContext {
            reference,
            source,
            reference_columns: ColumnIndex::new(reference.headers()),
            source_columns,
            reference_key,
            source_index,
        };

        let rows = self.evaluate_rows(&ctx);
        let documents: Vec<String> = self.registry.documents.iter().map(|d| d.name.clone()).collect();
        let summary = compute_summary(&rows, &documents);

        info!(
            rows = summary.total_rows,
            matched = summary.matched,
            not_found = summary.not_found,
            duplicate_rejected = summary.duplicate_rejected,
            clean = summary.clean_rows,
            "reconciliation finished"
        );

        Ok(ReconResult {
            meta: ReconMeta {
                registry_name: self.registry.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            documents,
            rows,
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_rows(&self, ctx: &RunContext<'_>) -> Vec<RowOutcome> {
        (0..ctx.reference.len()).map(|i| self.evaluate_row(ctx, i)).collect()
    }

    #[cfg(feature = "parallel")]
    fn evaluate_rows(&self, ctx: &RunContext<'_>) -> Vec<RowOutcome> {
        use rayon::prelude::*;
        (0..ctx.reference.len())
            .into_par_iter()
            .map(|i| self.evaluate_row(ctx, i))
            .collect()
    }

    fn evaluate_row(&self, ctx: &RunContext<'_>, row: usize) -> RowOutcome {
        let cells = &ctx.reference.rows()[row];
        let key = join_key(cells.get(ctx.reference_key).map(String::as_str));
        let found = ctx
            .source_index
            .select(key.as_deref(), self.config.duplicate_policy);
        let key = key.unwrap_or_default();
        let n_docs = self.registry.documents.len();

        match found {
            SourceMatch::NotFound => {
                debug!(row, key = %key, "reference row has no source row");
                RowOutcome {
                    row,
                    key,
                    status: RowStatus::NotFound,
                    source_row: None,
                    cells: vec![EvidenceCell::NotFound; n_docs],
                }
            }
            SourceMatch::Rejected(count) => {
                debug!(row, key = %key, count, "reference row rejected: duplicate source rows");
                RowOutcome {
                    row,
                    key,
                    status: RowStatus::DuplicateRejected,
                    source_row: None,
                    cells: vec![EvidenceCell::DuplicateSource; n_docs],
                }
            }
            SourceMatch::Found(source_row) => {
                let reference = RecordView::new(&ctx.reference_columns, cells);
                let source = RecordView::new(&ctx.source_columns, &ctx.source.rows()[source_row]);
                let cells = self
                    .registry
                    .documents
                    .iter()
                    .map(|doc| self.document_cell(doc, reference, source))
                    .collect();
                RowOutcome {
                    row,
                    key,
                    status: RowStatus::Matched,
                    source_row: Some(source_row),
                    cells,
                }
            }
        }
    }

    fn document_cell(
        &self,
        doc: &DocumentMapping,
        reference: RecordView<'_>,
        source: RecordView<'_>,
    ) -> EvidenceCell {
        let mut tokens = Vec::new();
        for field in &doc.fields {
            self.field_tokens(field, reference, source, &mut tokens);
        }
        EvidenceCell::Tokens(tokens)
    }

    fn field_tokens(
        &self,
        field: &FieldMapping,
        reference: RecordView<'_>,
        source: RecordView<'_>,
        out: &mut Vec<EvidenceToken>,
    ) {
        let (cross, plain): (Vec<&FieldSpec>, Vec<&FieldSpec>) =
            field.specs.iter().partition(|s| s.cross_reference);

        for spec in cross {
            out.push(self.cross_token(spec, source));
        }
        if plain.is_empty() {
            return;
        }

        let ref_value = self.reference_value(&field.name, reference);
        if is_blank(Some(ref_value.as_str())) {
            out.extend(plain.iter().map(|_| EvidenceToken::MissingReference(field.name.clone())));
            return;
        }

        for spec in plain {
            let src_value = match source.get(&spec.source_column) {
                Some(v) if !is_blank(Some(v)) => v,
                _ => {
                    out.push(EvidenceToken::MissingSource(field.name.clone()));
                    continue;
                }
            };
            self.spec_tokens(spec, &field.name, &ref_value, src_value, reference, out);
        }
    }

    fn spec_tokens(
        &self,
        spec: &FieldSpec,
        field: &str,
        ref_value: &str,
        src_value: &str,
        reference: RecordView<'_>,
        out: &mut Vec<EvidenceToken>,
    ) {
        match spec.special_rule {
            Some(SpecialRule::FullNameComponents) => {
                let components = self.name_components(reference);
                out.extend(full_name_tokens(&components, src_value, field));
            }
            Some(SpecialRule::DisbursementWindow) => {
                let verdict = disbursement_window(
                    ref_value,
                    src_value,
                    self.config.disbursement_window_months,
                );
                out.extend(verdict.tokens(field));
            }
            Some(SpecialRule::RateTolerance) => {
                let check = RateCheck::evaluate(ref_value, src_value);
                let detail = self
                    .config
                    .verbose_rates
                    .then(|| check.detail(ref_value, src_value));
                out.extend(check.tokens(field, self.config.rate_tolerance, detail));
            }
            None => {
                if compare(ref_value, src_value, spec.value_type, self.config) {
                    out.push(EvidenceToken::ok());
                } else {
                    out.push(EvidenceToken::failure(field));
                }
            }
        }
    }

    /// Source-internal check; the reference row is not consulted.
    fn cross_token(&self, spec: &FieldSpec, source: RecordView<'_>) -> EvidenceToken {
        let left = spec.source_column.as_str();
        let right = spec.source_column_secondary.as_deref().unwrap_or_default();
        let a = source.get(left);
        let b = source.get(right);

        match (is_blank(a), is_blank(b)) {
            (true, true) => EvidenceToken::MissingSource(format!("{left} vs {right}")),
            (true, false) => EvidenceToken::MissingSource(left.to_string()),
            (false, true) => EvidenceToken::MissingSource(right.to_string()),
            (false, false) => {
                let (a, b) = (a.unwrap_or_default(), b.unwrap_or_default());
                if compare(a, b, spec.value_type, self.config) {
                    EvidenceToken::ok()
                } else {
                    EvidenceToken::CrossFailure {
                        left: left.to_string(),
                        right: right.to_string(),
                    }
                }
            }
        }
    }

    /// Reference-side value of `field`: synthesized full name, mapped
    /// column, or the aliased column when the mapped one is blank.
    fn reference_value(&self, field: &str, reference: RecordView<'_>) -> String {
        let accessors = &self.registry.reference;
        if accessors.is_full_name_field(field) {
            return self
                .name_components(reference)
                .iter()
                .map(|(_, v)| v.trim())
                .filter(|v| !is_blank(Some(*v)))
                .collect::<Vec<_>>()
                .join(" ");
        }

        let primary = reference.get(&accessors.column_for(field));
        if !is_blank(primary) {
            return primary.unwrap_or_default().to_string();
        }
        accessors
            .alias_for(field)
            .and_then(|alias| reference.get(&alias))
            .unwrap_or_default()
            .to_string()
    }

    fn name_components<'r>(&'r self, reference: RecordView<'r>) -> Vec<(&'r str, &'r str)> {
        self.registry
            .reference
            .name_components
            .iter()
            .map(|c| (c.as_str(), reference.get(c).unwrap_or_default()))
            .collect()
    }

    fn reference_key_description(&self) -> String {
        let accessors = &self.registry.reference;
        let mut names = accessors.key_aliases.clone();
        if let Some(fragment) = &accessors.key_fragment {
            names.push(format!("*{fragment}*"));
        }
        names.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DUPLICATE_SOURCE, NOT_FOUND};
    use crate::registry::ValueType;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn registry(toml: &str) -> Registry {
        Registry::from_toml(toml).unwrap()
    }

    const SMALL: &str = r#"
name = "small"

[reference]
name_components = ["PRIMER NOMBRE", "PRIMER APELLIDO"]
full_name_fields = ["NOMBRE COMPLETO"]

[reference.aliases]
"MONTO INICIAL" = "MONTO INCIAL"

[[document]]
name = "LIBRANZA"

[[document.field]]
name = "NOMBRE COMPLETO"
specs = [{ source_column = "libranza_nombre", value_type = "text", special_rule = "full_name_components" }]

[[document.field]]
name = "CEDULA"
specs = [
    { source_column = "libranza_cedula", value_type = "number" },
    { source_column = "libranza_cedula_firma", value_type = "number" },
]

[[document.field]]
name = "MONTO INICIAL"
specs = [{ source_column = "libranza_valor", value_type = "number" }]

[[document]]
name = "SOLICITUD"

[[document.field]]
name = "SOLICITUD VS AMORTIZACION"
specs = [{ source_column = "sol_numero", source_column_secondary = "amort_numero", value_type = "number", cross_reference = true }]

[[document]]
name = "VACIO"
"#;

    fn reference() -> Table {
        Table::from_rows(
            strings(&["Operación", "PRIMER NOMBRE", "PRIMER APELLIDO", "CEDULA", "MONTO INCIAL"]),
            vec![
                strings(&["1001", "María", "Pérez", "52.123.456", "5.000.000"]),
                strings(&["1002", "", "", "", ""]),
                strings(&["9999", "Ana", "Ruiz", "1", "1"]),
            ],
        )
    }

    fn source() -> Table {
        Table::from_rows(
            strings(&[
                "Numero credito",
                "libranza_nombre",
                "libranza_cedula",
                "libranza_cedula_firma",
                "libranza_valor",
                "sol_numero",
                "amort_numero",
            ]),
            vec![
                strings(&["1001", "PEREZ MARIA", "52123456", "", "5000000", "77", "77"]),
                strings(&["1.002", "X", "1", "1", "", "", "88"]),
            ],
        )
    }

    fn cell(result: &ReconResult, row: usize, doc: usize) -> String {
        result.rows[row].cells[doc].to_string()
    }

    #[test]
    fn evaluates_every_document_per_row() {
        let reg = registry(SMALL);
        let config = EngineConfig::default();
        let result = run(&reg, &config, &reference(), &source()).unwrap();

        assert_eq!(result.documents, strings(&["LIBRANZA", "SOLICITUD", "VACIO"]));
        assert_eq!(cell(&result, 0, 0), "OK, OK, MISSING_SOURCE:CEDULA, OK");
        assert_eq!(cell(&result, 0, 1), "OK");
        assert_eq!(cell(&result, 0, 2), "");
        assert_eq!(result.rows[0].status, RowStatus::Matched);
        assert_eq!(result.rows[0].source_row, Some(0));
    }

    #[test]
    fn blank_reference_emits_one_token_per_spec() {
        let reg = registry(SMALL);
        let result = run(&reg, &EngineConfig::default(), &reference(), &source()).unwrap();
        assert_eq!(
            cell(&result, 1, 0),
            "MISSING_REFERENCE:NOMBRE COMPLETO, MISSING_REFERENCE:CEDULA, \
             MISSING_REFERENCE:CEDULA, MISSING_REFERENCE:MONTO INICIAL"
        );
        assert_eq!(cell(&result, 1, 1), "MISSING_SOURCE:sol_numero");
    }

    #[test]
    fn unmatched_row_is_not_found_everywhere() {
        let reg = registry(SMALL);
        let result = run(&reg, &EngineConfig::default(), &reference(), &source()).unwrap();
        assert!(result.rows[2].cells.iter().all(|c| c.to_string() == NOT_FOUND));
        assert_eq!(result.rows[2].status, RowStatus::NotFound);
        assert_eq!(result.summary.not_found, 1);
        assert_eq!(result.summary.matched, 2);
    }

    #[test]
    fn alias_column_used_when_primary_blank() {
        let reg = registry(SMALL);
        let reference = Table::from_rows(
            strings(&["OPERACION", "MONTO INICIAL", "MONTO INCIAL"]),
            vec![strings(&["1001", " ", "5000000"])],
        );
        let result = run(&reg, &EngineConfig::default(), &reference, &source()).unwrap();
        assert!(cell(&result, 0, 0).ends_with("MISSING_REFERENCE:CEDULA, OK"));
    }

    #[test]
    fn duplicate_policy() {
        let reg = registry(SMALL);
        let mut src = source();
        src.push_row(strings(&["1001", "OTRO", "0", "", "0", "1", "2"]));

        let first = run(&reg, &EngineConfig::default(), &reference(), &src).unwrap();
        assert_eq!(first.rows[0].source_row, Some(0));

        let reject = EngineConfig {
            duplicate_policy: crate::config::DuplicatePolicy::Reject,
            ..EngineConfig::default()
        };
        let rejected = run(&reg, &reject, &reference(), &src).unwrap();
        assert!(rejected.rows[0].cells.iter().all(|c| c.to_string() == DUPLICATE_SOURCE));
        assert_eq!(rejected.summary.duplicate_rejected, 1);
    }

    #[test]
    fn cross_reference_both_blank_and_mismatch() {
        let mut reg = registry(SMALL);
        reg.documents[1].fields[0].specs[0] = FieldSpec::cross("sol_numero", "amort_numero", ValueType::Number);
        let src = Table::from_rows(
            strings(&["Numero credito", "sol_numero", "amort_numero"]),
            vec![
                strings(&["1001", "", ""]),
                strings(&["1002", "1001", "1002"]),
            ],
        );
        let result = run(&reg, &EngineConfig::default(), &reference(), &src).unwrap();
        assert_eq!(cell(&result, 0, 1), "MISSING_SOURCE:sol_numero vs amort_numero");
        assert_eq!(cell(&result, 1, 1), "FAILURE:sol_numero vs amort_numero");
    }

    #[test]
    fn missing_key_columns_are_errors() {
        let reg = registry(SMALL);
        let no_key = Table::from_rows(strings(&["CEDULA"]), vec![]);
        let err = run(&reg, &EngineConfig::default(), &no_key, &source()).unwrap_err();
        assert!(matches!(err, ReconError::MissingKeyColumn { ref table, .. } if table == "reference"));

        let no_src_key = Table::from_rows(strings(&["credito"]), vec![]);
        let err = run(&reg, &EngineConfig::default(), &reference(), &no_src_key).unwrap_err();
        assert!(matches!(err, ReconError::MissingKeyColumn { ref table, .. } if table == "source"));
    }

    #[test]
    fn reconciler_is_reusable_with_other_settings() {
        let reg = registry(SMALL);
        let loose = EngineConfig::default();
        let strict = EngineConfig::strict();
        let a = Reconciler::new(&reg, &loose).run(&reference(), &source()).unwrap();
        let b = Reconciler::new(&reg, &strict).run(&reference(), &source()).unwrap();
        assert_eq!(a.rows.len(), b.rows.len());
    }
}
