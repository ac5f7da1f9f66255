//! A provisioned IMS subscriber: network identity plus the SIM secrets needed to answer an
//! AKAv1-MD5 challenge.

use imsua_milenage::SubscriberKeys;
use serde::{Deserialize, Serialize};

/// The operator key material an account carries, either form accepted the way the USIM applet
/// itself is provisioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperatorKey {
    /// Already-derived OPc.
    Opc([u8; 16]),
    /// Operator-wide OP; OPc is derived from it and `Ki` on first use.
    Op([u8; 16]),
}

/// {MCC, MNC, IMSI, Ki, OP-or-OPc, AMF}, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub mcc: u16,
    pub mnc: u16,
    pub imsi: String,
    pub ki: [u8; 16],
    pub operator_key: OperatorKey,
    pub amf: [u8; 2],
}

impl Account {
    pub fn new(mcc: u16, mnc: u16, imsi: impl Into<String>, ki: [u8; 16], operator_key: OperatorKey, amf: [u8; 2]) -> Self {
        Self {
            mcc,
            mnc,
            imsi: imsi.into(),
            ki,
            operator_key,
            amf,
        }
    }

    /// Derives `SubscriberKeys`, computing OPc from OP if the account was provisioned with OP
    /// rather than a pre-derived OPc.
    pub fn subscriber_keys(&self) -> SubscriberKeys {
        match self.operator_key {
            OperatorKey::Opc(opc) => SubscriberKeys::with_opc(self.ki, opc),
            OperatorKey::Op(op) => SubscriberKeys::with_op(self.ki, op),
        }
    }

    /// The IMS home-network realm this account authenticates against:
    /// `ims.mnc<MNC:03d>.mcc<MCC:03d>.3gppnetwork.org`.
    pub fn realm(&self) -> String {
        format!("ims.mnc{:03}.mcc{:03}.3gppnetwork.org", self.mnc, self.mcc)
    }

    /// The digest username, conventionally the IMSI for AKAv1-MD5.
    pub fn digest_username(&self) -> &str {
        &self.imsi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_is_zero_padded() {
        let account = Account::new(1, 1, "001010000000001", [0u8; 16], OperatorKey::Opc([0u8; 16]), [0, 0]);
        assert_eq!(account.realm(), "ims.mnc001.mcc001.3gppnetwork.org");
    }

    #[test]
    fn op_form_derives_opc_lazily() {
        let account = Account::new(1, 1, "001010000000001", [0x11u8; 16], OperatorKey::Op([0x22u8; 16]), [0, 0]);
        let keys = account.subscriber_keys();
        let expected = SubscriberKeys::with_op([0x11u8; 16], [0x22u8; 16]);
        assert_eq!(keys.opc, expected.opc);
    }
}
