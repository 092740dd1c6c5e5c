//! Decoding of execution notifications.
//!
//! A contract reports its application-level outcome through a notification
//! whose first state is a little-endian status code. Notifications from the
//! authorization contract are inspected as well: a failed `verifyToken`
//! means the caller lacked the role required by the method.

use tracing::error;

use crate::auth::AUTH_CONTRACT;
use crate::chain::{NotifyEvent, NotifyState};
use crate::error::{codes, ServiceError, ServiceResult};
use crate::types::Address;

/// Status code of a successful call
pub const STATUS_OK: u64 = 0;

fn state_is(state: &NotifyState, name: &str) -> bool {
    match state {
        NotifyState::Hex(raw) if raw == name => true,
        other => other.as_utf8().is_some_and(|text| text == name),
    }
}

fn check_auth_event(contract: &Address, event: &NotifyEvent) -> ServiceResult<()> {
    let Some(method) = event.states.first() else {
        return Err(ServiceError::internal("empty authorization notification"));
    };
    if state_is(method, "verifyToken") {
        let allowed = event.states.get(4).and_then(NotifyState::as_bool);
        if allowed != Some(true) {
            let function = event.states.get(3).and_then(NotifyState::as_utf8);
            error!(%contract, function = ?function, "unauthorized invocation");
            return Err(ServiceError::ContractUnauthorized);
        }
        return Ok(());
    }
    if state_is(method, "initContractAdmin") {
        return Ok(());
    }
    error!(%contract, method = ?method, "unhandled authorization notification");
    Err(ServiceError::internal("unhandled authorization notification"))
}

/// Map the states of a contract notification to its output. The leading
/// status is stripped on success.
pub fn decode_status(states: &[NotifyState]) -> ServiceResult<Vec<NotifyState>> {
    let (status, rest) = states
        .split_first()
        .ok_or_else(|| ServiceError::internal("notification without status"))?;
    let code = status
        .as_number()
        .ok_or_else(|| ServiceError::internal(format!("undecodable status {status:?}")))?;
    if code == STATUS_OK {
        return Ok(rest.to_vec());
    }
    let code = u32::try_from(code)
        .map_err(|_| ServiceError::internal(format!("status {code} out of range")))?;
    match code {
        codes::CONTRACT_UNAUTHORIZED => Err(ServiceError::ContractUnauthorized),
        codes::CONTRACT_FAILED => {
            let message = rest
                .first()
                .and_then(NotifyState::as_utf8)
                .unwrap_or_default();
            Err(ServiceError::ContractFailed(message))
        }
        other => Err(ServiceError::from_contract_code(other)),
    }
}

/// Scan `events` for the output of `contract`.
///
/// Notifications of other contracts are ignored, except those of the
/// authorization contract. The last notification of `contract` wins; none
/// at all is a valid empty result.
pub fn decode_notifications(
    contract: &Address,
    events: &[NotifyEvent],
) -> ServiceResult<Option<Vec<NotifyState>>> {
    let mut output = None;
    for event in events {
        if event.is_from(&AUTH_CONTRACT) {
            check_auth_event(contract, event)?;
        } else if event.is_from(contract) {
            output = Some(event.states.as_slice());
        }
    }
    output.map(decode_status).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{hex_state, notify, num_state};

    fn contract() -> Address {
        Address::from_bytes([0x42; 20])
    }

    #[test]
    fn test_ok_status_is_stripped() {
        let events = vec![notify(&contract(), vec![num_state(0), num_state(13)])];
        let out = decode_notifications(&contract(), &events).unwrap().unwrap();
        assert_eq!(out, vec![num_state(13)]);
    }

    #[test]
    fn test_empty_status_hex_is_ok() {
        let events = vec![notify(&contract(), vec![NotifyState::Hex(String::new())])];
        let out = decode_notifications(&contract(), &events).unwrap().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_no_matching_notification_is_empty_result() {
        let other = Address::from_bytes([0x01; 20]);
        let events = vec![notify(&other, vec![num_state(20401)])];
        assert_eq!(decode_notifications(&contract(), &events).unwrap(), None);
        assert_eq!(decode_notifications(&contract(), &[]).unwrap(), None);
    }

    #[test]
    fn test_reserved_codes() {
        let c = contract();
        let unauthorized = vec![notify(&c, vec![num_state(20401)])];
        assert_eq!(
            decode_notifications(&c, &unauthorized),
            Err(ServiceError::ContractUnauthorized)
        );

        let failed = vec![notify(&c, vec![num_state(20001), hex_state("bad input")])];
        assert_eq!(
            decode_notifications(&c, &failed),
            Err(ServiceError::ContractFailed("bad input".into()))
        );

        let price = vec![notify(&c, vec![num_state(20402)])];
        assert_eq!(
            decode_notifications(&c, &price),
            Err(ServiceError::ContractNotEnoughPrice)
        );

        let custom = vec![notify(&c, vec![num_state(777)])];
        assert_eq!(decode_notifications(&c, &custom), Err(ServiceError::Contract(777)));
    }

    #[test]
    fn test_malformed_payloads_are_internal() {
        let c = contract();
        let empty = vec![notify(&c, vec![])];
        assert!(matches!(
            decode_notifications(&c, &empty),
            Err(ServiceError::Internal(_))
        ));
        let list = vec![notify(&c, vec![NotifyState::List(vec![])])];
        assert!(matches!(
            decode_notifications(&c, &list),
            Err(ServiceError::Internal(_))
        ));
    }

    #[test]
    fn test_verify_token_inspection() {
        let c = contract();
        let denied = notify(
            &AUTH_CONTRACT,
            vec![
                NotifyState::Hex("verifyToken".into()),
                NotifyState::Hex(c.to_contract_hex()),
                NotifyState::Hex("did:ont:A".into()),
                NotifyState::Hex("Set".into()),
                NotifyState::Bool(false),
            ],
        );
        let ok = notify(&c, vec![num_state(0)]);
        assert_eq!(
            decode_notifications(&c, &[denied, ok.clone()]),
            Err(ServiceError::ContractUnauthorized)
        );

        let allowed = notify(
            &AUTH_CONTRACT,
            vec![
                hex_state("verifyToken"),
                NotifyState::Hex(c.to_contract_hex()),
                hex_state("did:ont:A"),
                hex_state("Set"),
                NotifyState::Bool(true),
            ],
        );
        assert_eq!(
            decode_notifications(&c, &[allowed, ok]).unwrap(),
            Some(vec![])
        );
    }

    #[test]
    fn test_other_auth_methods() {
        let c = contract();
        let init = notify(&AUTH_CONTRACT, vec![NotifyState::Hex("initContractAdmin".into())]);
        assert_eq!(decode_notifications(&c, &[init]).unwrap(), None);

        let unknown = notify(&AUTH_CONTRACT, vec![NotifyState::Hex("transfer".into())]);
        assert!(matches!(
            decode_notifications(&c, &[unknown]),
            Err(ServiceError::Internal(_))
        ));
    }
}
