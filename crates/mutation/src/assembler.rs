//! Assembly of one template into one source model.

use crate::templates::{MutationTemplate, TemplateId};
use detectors::AccountingTarget;
use regex::Regex;
use serde::{Deserialize, Serialize};
use source::SourceModel;
use std::path::PathBuf;
use thiserror::Error;

/// Assembly failures are fatal for the single (file, target, template) unit
/// they occur in, never for the batch.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no contract declaration found in {0}")]
    NoContract(PathBuf),

    #[error("no closing brace found in {0}")]
    NoInsertionPoint(PathBuf),

    #[error("assembled mutant failed integrity check: {0}")]
    Integrity(String),
}

/// One assembled mutant: its own copy of the text, a collision-free contract
/// name, and the metadata reporting needs. Created here, serialized
/// immediately by the caller, never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutantContract {
    /// Derived contract name, unique per (original, mapping, template).
    pub contract_name: String,
    /// Full source text of the mutant.
    pub text: String,
    /// File the mutant was generated from.
    pub source_file: PathBuf,
    /// The accounting target the injected code is wired to.
    pub target: AccountingTarget,
    /// Which template was injected.
    pub template_id: TemplateId,
}

impl MutantContract {
    /// Deterministic output file name, so re-runs overwrite rather than
    /// accumulate duplicates.
    pub fn file_name(&self) -> String {
        let stem = self
            .source_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "contract".to_string());
        format!(
            "{stem}_{}_{}.sol",
            self.target.mapping_name, self.template_id
        )
    }
}

/// Merges a template into a contract: declaration backfill, payable
/// entrypoints, end-of-contract insertion, rename, integrity check.
pub struct MutationAssembler;

impl MutationAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assemble `template` into `model` for `target`.
    pub fn assemble(
        &self,
        model: &SourceModel,
        target: &AccountingTarget,
        template: &MutationTemplate,
    ) -> Result<MutantContract, AssemblyError> {
        let mut model = model.clone();

        let original_name = model
            .contract_name()
            .ok_or_else(|| AssemblyError::NoContract(model.path().to_path_buf()))?;

        if template.requires_payable {
            self.ensure_value_acceptance(&mut model)?;
        }

        let fragment = self.build_fragment(&model, target, template);
        let brace = model
            .final_brace_line()
            .ok_or_else(|| AssemblyError::NoInsertionPoint(model.path().to_path_buf()))?;
        for (offset, line) in fragment.lines().enumerate() {
            model.insert_line(brace + offset, line.to_string());
        }

        let mutant_name = format!(
            "{original_name}_Inj_{}_{}",
            target.mapping_name, template.id
        );
        let text = self.rename_contract(&model.text(), &original_name, &mutant_name);

        self.check_integrity(&text, &mutant_name, template)?;

        tracing::debug!(
            source = %model.path().display(),
            contract = %mutant_name,
            template = %template.id,
            "mutant assembled"
        );
        Ok(MutantContract {
            contract_name: mutant_name,
            text,
            source_file: model.path().to_path_buf(),
            target: target.clone(),
            template_id: template.id.clone(),
        })
    }

    /// The template references the target's names; when a name came from a
    /// detection fallback it may not be declared anywhere, so the fragment
    /// declares it itself to keep the mutant independently compilable.
    fn build_fragment(
        &self,
        model: &SourceModel,
        target: &AccountingTarget,
        template: &MutationTemplate,
    ) -> String {
        let mut decls = String::new();
        if !declares_mapping(model, &target.mapping_name) {
            decls.push_str(&format!(
                "\n    mapping(address => uint256) public {};",
                target.mapping_name
            ));
        }
        if !declares_aggregate(model, &target.aggregate_name) {
            decls.push_str(&format!(
                "\n    uint256 public {};",
                target.aggregate_name
            ));
        }
        format!("{decls}{}", template.code)
    }

    /// Make sure the contract can be funded with bare value transfers.
    /// A payable constructor is synthesized only when no constructor exists
    /// at all; a second constructor would not compile. The receive handler is
    /// added whenever missing, next to the constructor.
    fn ensure_value_acceptance(&self, model: &mut SourceModel) -> Result<(), AssemblyError> {
        let insert_at = match constructor_line(model) {
            Some(line) => line,
            None => {
                let open = model
                    .contract_body_start()
                    .ok_or_else(|| AssemblyError::NoContract(model.path().to_path_buf()))?;
                model.insert_line(open + 1, "    constructor() payable {}".to_string());
                open + 2
            }
        };
        if !model.has_receive() {
            model.insert_line(insert_at, "    receive() external payable {}".to_string());
        }
        Ok(())
    }

    /// Rename exactly one occurrence of the original declaration.
    fn rename_contract(&self, text: &str, original: &str, renamed: &str) -> String {
        let re = Regex::new(&format!(r"contract\s+{}\b", regex::escape(original))).unwrap();
        re.replace(text, format!("contract {renamed}")).into_owned()
    }

    /// Post-condition: exactly one declaration of the new name, non-empty
    /// text, and the template's signature marker present.
    fn check_integrity(
        &self,
        text: &str,
        mutant_name: &str,
        template: &MutationTemplate,
    ) -> Result<(), AssemblyError> {
        if text.trim().is_empty() {
            return Err(AssemblyError::Integrity("assembled text is empty".into()));
        }
        let decl_re =
            Regex::new(&format!(r"contract\s+{}\b", regex::escape(mutant_name))).unwrap();
        let declarations = decl_re.find_iter(text).count();
        if declarations != 1 {
            return Err(AssemblyError::Integrity(format!(
                "expected exactly one declaration of '{mutant_name}', found {declarations}"
            )));
        }
        let signature = format!("[INJECTED:{}]", template.id);
        if !text.contains(&signature) {
            return Err(AssemblyError::Integrity(format!(
                "signature '{signature}' missing from assembled text"
            )));
        }
        Ok(())
    }
}

impl Default for MutationAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn declares_mapping(model: &SourceModel, mapping: &str) -> bool {
    model
        .lines()
        .iter()
        .any(|line| line.contains("mapping") && line.contains(mapping) && line.contains(';'))
}

fn declares_aggregate(model: &SourceModel, aggregate: &str) -> bool {
    let re = Regex::new(&format!(
        r"uint\d*\s+(?:(?:public|private|internal)\s+)?{}\s*(?:=[^;]*)?;",
        regex::escape(aggregate)
    ))
    .unwrap();
    model.lines().iter().any(|line| re.is_match(line))
}

fn constructor_line(model: &SourceModel) -> Option<usize> {
    model
        .lines()
        .iter()
        .position(|line| line.trim_start().starts_with("constructor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::VariantGenerator;

    const BANK: &str = r#"pragma solidity ^0.8.0;

contract Bank {
    mapping(address => uint256) public balances;
    uint256 public totalDeposits;

    function deposit() public payable {
        balances[msg.sender] += msg.value;
        totalDeposits += msg.value;
    }
}
"#;

    fn target() -> AccountingTarget {
        AccountingTarget::new("balances", "totalDeposits")
    }

    fn assemble(text: &str, template_index: usize) -> MutantContract {
        let model = SourceModel::from_text("Bank.sol", text);
        let templates = VariantGenerator::variants(&target());
        MutationAssembler::new()
            .assemble(&model, &target(), &templates[template_index])
            .unwrap()
    }

    #[test]
    fn classic_variant_gets_derived_name() {
        let mutant = assemble(BANK, 0);
        assert_eq!(mutant.contract_name, "Bank_Inj_balances_classic_call");
        assert!(mutant
            .text
            .contains("contract Bank_Inj_balances_classic_call"));
        assert!(!mutant.text.contains("contract Bank {"));
    }

    #[test]
    fn injection_lands_before_final_brace() {
        let mutant = assemble(BANK, 0);
        let last_line = mutant.text.trim_end().lines().last().unwrap();
        assert_eq!(last_line.trim(), "}");
        assert!(mutant.text.contains("withdraw_classic_call"));
    }

    #[test]
    fn existing_declarations_are_not_duplicated() {
        let mutant = assemble(BANK, 0);
        assert_eq!(
            mutant
                .text
                .matches("mapping(address => uint256) public balances;")
                .count(),
            1
        );
        assert_eq!(
            mutant.text.matches("uint256 public totalDeposits;").count(),
            1
        );
    }

    #[test]
    fn missing_declarations_are_backfilled() {
        let bare = "contract Empty {\n}\n";
        let mutant = assemble(bare, 0);
        assert!(mutant
            .text
            .contains("mapping(address => uint256) public balances;"));
        assert!(mutant.text.contains("uint256 public totalDeposits;"));
    }

    #[test]
    fn payable_templates_synthesize_constructor_and_receive() {
        let mutant = assemble(BANK, 1);
        assert!(mutant.text.contains("constructor() payable {}"));
        assert!(mutant.text.contains("receive() external payable {}"));
    }

    #[test]
    fn existing_constructor_only_gains_receive() {
        let src = r#"contract Bank {
    mapping(address => uint256) public balances;
    uint256 public totalDeposits;

    constructor() {
    }
}
"#;
        let mutant = assemble(src, 1);
        assert!(!mutant.text.contains("constructor() payable {}"));
        assert!(mutant.text.contains("receive() external payable {}"));
        // Receive sits before the original constructor.
        let receive_pos = mutant.text.find("receive()").unwrap();
        let ctor_pos = mutant.text.find("constructor()").unwrap();
        assert!(receive_pos < ctor_pos);
    }

    #[test]
    fn classic_template_leaves_entrypoints_alone() {
        let mutant = assemble(BANK, 0);
        assert!(!mutant.text.contains("constructor() payable {}"));
        assert!(!mutant.text.contains("receive() external payable {}"));
    }

    #[test]
    fn mutant_names_are_unique_within_a_run() {
        let model = SourceModel::from_text("Bank.sol", BANK);
        let assembler = MutationAssembler::new();
        let targets = [
            AccountingTarget::new("balances", "totalDeposits"),
            AccountingTarget::new("stakes", "totalDeposits"),
        ];
        let mut names = std::collections::HashSet::new();
        for target in &targets {
            for template in VariantGenerator::variants(target) {
                let mutant = assembler.assemble(&model, target, &template).unwrap();
                assert!(names.insert(mutant.contract_name.clone()));
            }
        }
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn file_names_are_deterministic() {
        let a = assemble(BANK, 0);
        let b = assemble(BANK, 0);
        assert_eq!(a.file_name(), b.file_name());
        assert_eq!(a.file_name(), "Bank_balances_classic_call.sol");
    }

    #[test]
    fn contractless_input_is_an_assembly_error() {
        let model = SourceModel::from_text("NotAContract.sol", "library Math {\n}\n");
        let templates = VariantGenerator::variants(&target());
        let err = MutationAssembler::new()
            .assemble(&model, &target(), &templates[0])
            .unwrap_err();
        assert!(matches!(err, AssemblyError::NoContract(_)));
    }

    #[test]
    fn only_first_contract_occurrence_is_renamed() {
        let src = r#"contract Bank {
    mapping(address => uint256) public balances;
    uint256 public totalDeposits;
}

contract BankUser {
    Bank bank;
}
"#;
        let mutant = assemble(src, 0);
        assert!(mutant.text.contains("contract Bank_Inj_balances_classic_call"));
        assert!(mutant.text.contains("contract BankUser"));
    }
}
