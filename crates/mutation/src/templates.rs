//! The fixed catalogue of vulnerable-function templates.
//!
//! Every template injects a funded deposit path that credits both the balance
//! mapping and the aggregate, and a withdrawal path that makes its external
//! call before the balance update and never touches the aggregate. The
//! omission is deliberate: once any value leaves through the vulnerable path,
//! `address(this).balance` drops below the aggregate and the per-template
//! Echidna oracle goes false — a ground-truth positive that does not depend
//! on the fuzzer actually triggering reentrancy.

use detectors::AccountingTarget;
use serde::{Deserialize, Serialize};

/// Number of templates in the catalogue, fixed regardless of input.
pub const CATALOGUE_SIZE: usize = 5;

/// Stable identifier for one mutation template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, parameterized code fragment ready for assembly into a contract.
///
/// Templates are immutable and enumerated once per run; they are derived from
/// the target's names, never from the input contract's code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationTemplate {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    /// Whether the host contract must accept bare value transfers (payable
    /// constructor / receive handler) for the variant to be exploitable.
    pub requires_payable: bool,
    /// The Solidity fragment, indented for insertion into a contract body.
    pub code: String,
}

/// Produces the fixed catalogue for a given accounting target. Pure function
/// of the target: same names in, same five templates out.
pub struct VariantGenerator;

impl VariantGenerator {
    /// Enumerate all templates for `target`, in catalogue order.
    pub fn variants(target: &AccountingTarget) -> Vec<MutationTemplate> {
        vec![
            Self::classic_call(target),
            Self::unchecked_send(target),
            Self::transfer_zeroing(target),
            Self::cross_function(target),
            Self::delegated_call(target),
        ]
    }

    /// Classic check-effects-interaction violation: low-level call before the
    /// balance update.
    fn classic_call(target: &AccountingTarget) -> MutationTemplate {
        let map = &target.mapping_name;
        let agg = &target.aggregate_name;
        MutationTemplate {
            id: TemplateId("classic_call".to_string()),
            name: "Classic call reentrancy".to_string(),
            description: "Low-level call.value transfer before the balance update".to_string(),
            requires_payable: false,
            code: format!(
                r#"
    // [INJECTED:classic_call]
    function deposit_classic_call() public payable {{
        require(msg.value > 0, "deposit something");
        {map}[msg.sender] += msg.value;
        {agg} += msg.value;
    }}

    function withdraw_classic_call(uint256 _amount) public {{
        require({map}[msg.sender] >= _amount, "insufficient balance");
        (bool success, ) = msg.sender.call{{value: _amount}}("");
        require(success, "transfer failed");
        {map}[msg.sender] -= _amount;
    }}

    function echidna_test_classic_call() public view returns (bool) {{
        return address(this).balance >= {agg};
    }}"#
            ),
        }
    }

    /// Legacy `send`-based transfer with the state update after it.
    fn unchecked_send(target: &AccountingTarget) -> MutationTemplate {
        let map = &target.mapping_name;
        let agg = &target.aggregate_name;
        MutationTemplate {
            id: TemplateId("unchecked_send".to_string()),
            name: "Send-based reentrancy".to_string(),
            description: "Legacy send() transfer before the balance update".to_string(),
            requires_payable: true,
            code: format!(
                r#"
    // [INJECTED:unchecked_send]
    function deposit_unchecked_send() public payable {{
        require(msg.value > 0, "deposit something");
        {map}[msg.sender] += msg.value;
        {agg} += msg.value;
    }}

    function withdraw_unchecked_send(uint256 _amount) public {{
        require({map}[msg.sender] >= _amount, "insufficient balance");
        require(payable(msg.sender).send(_amount), "send failed");
        {map}[msg.sender] -= _amount;
    }}

    function echidna_test_unchecked_send() public view returns (bool) {{
        return address(this).balance >= {agg};
    }}"#
            ),
        }
    }

    /// Legacy `transfer`-based payout; the balance is zeroed rather than
    /// decremented, after the transfer.
    fn transfer_zeroing(target: &AccountingTarget) -> MutationTemplate {
        let map = &target.mapping_name;
        let agg = &target.aggregate_name;
        MutationTemplate {
            id: TemplateId("transfer_zeroing".to_string()),
            name: "Transfer-based reentrancy".to_string(),
            description: "transfer() payout with balance zeroing after the transfer".to_string(),
            requires_payable: true,
            code: format!(
                r#"
    // [INJECTED:transfer_zeroing]
    function deposit_transfer_zeroing() public payable {{
        {map}[msg.sender] += msg.value;
        {agg} += msg.value;
    }}

    function withdraw_transfer_zeroing() public {{
        uint256 amount = {map}[msg.sender];
        require(amount > 0, "nothing to withdraw");
        payable(msg.sender).transfer(amount);
        {map}[msg.sender] = 0;
    }}

    function echidna_test_transfer_zeroing() public view returns (bool) {{
        return address(this).balance >= {agg};
    }}"#
            ),
        }
    }

    /// Cross-function variant: a second, shared pool of funds is drawn down
    /// by a second withdrawal function, so reentrancy through one entrypoint
    /// corrupts accounting observed by the other.
    fn cross_function(target: &AccountingTarget) -> MutationTemplate {
        let map = &target.mapping_name;
        let agg = &target.aggregate_name;
        MutationTemplate {
            id: TemplateId("cross_function".to_string()),
            name: "Cross-function reentrancy".to_string(),
            description: "Shared reward pool drained across two withdrawal functions".to_string(),
            requires_payable: true,
            code: format!(
                r#"
    // [INJECTED:cross_function]
    uint256 public rewardPool_cross_function;

    function deposit_cross_function() public payable {{
        {map}[msg.sender] += msg.value;
        {agg} += msg.value;
    }}

    function fundPool_cross_function() public payable {{
        rewardPool_cross_function += msg.value;
        {agg} += msg.value;
    }}

    function withdraw_cross_function() public {{
        uint256 amount = {map}[msg.sender];
        require(amount > 0, "no stake");
        (bool success, ) = msg.sender.call{{value: amount}}("");
        require(success, "transfer failed");
        {map}[msg.sender] = 0;
    }}

    function claimPool_cross_function() public {{
        require({map}[msg.sender] > 0, "must have stake");
        uint256 reward = rewardPool_cross_function / 10;
        (bool success, ) = msg.sender.call{{value: reward}}("");
        require(success, "transfer failed");
        rewardPool_cross_function -= reward;
    }}

    function echidna_test_cross_function() public view returns (bool) {{
        return address(this).balance >= {agg};
    }}"#
            ),
        }
    }

    /// Delegated-execution variant: control is handed to an attacker-supplied
    /// address before the contract finishes its own bookkeeping.
    fn delegated_call(target: &AccountingTarget) -> MutationTemplate {
        let map = &target.mapping_name;
        let agg = &target.aggregate_name;
        MutationTemplate {
            id: TemplateId("delegated_call".to_string()),
            name: "Delegated-execution reentrancy".to_string(),
            description: "Attacker-supplied delegatecall hook runs before the balance update"
                .to_string(),
            requires_payable: true,
            code: format!(
                r#"
    // [INJECTED:delegated_call]
    function deposit_delegated_call() public payable {{
        require(msg.value > 0, "deposit something");
        {map}[msg.sender] += msg.value;
        {agg} += msg.value;
    }}

    function withdraw_delegated_call(address hook, uint256 _amount) public {{
        require({map}[msg.sender] >= _amount, "insufficient balance");
        (bool sent, ) = msg.sender.call{{value: _amount}}("");
        require(sent, "transfer failed");
        (bool ok, ) = hook.delegatecall(
            abi.encodeWithSignature("onWithdraw(uint256)", _amount)
        );
        require(ok, "hook failed");
        {map}[msg.sender] -= _amount;
    }}

    function echidna_test_delegated_call() public view returns (bool) {{
        return address(this).balance >= {agg};
    }}"#
            ),
        }
    }
}
