use crate::{encoding, length, Zvt};

/// Chapter 3.4. Sent by the PT so the ECR can synchronize its clock.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x04, instr = 0x01)]
pub struct SetTimeAndDate {
    #[zvt_bmp(number = 0xaa, length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub date: usize,

    #[zvt_bmp(number = 0x0c, length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub time: usize,
}

/// PT-to-ECR status push, chapter 2.2.6. Carries the outcome of whatever
/// transaction is in flight: result code, amount, card data, trace number.
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x04, instr = 0x0f)]
pub struct StatusInformation {
    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x0b, length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub trace_number: Option<usize>,

    #[zvt_bmp(number = 0x0c, length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub time: Option<usize>,

    #[zvt_bmp(number = 0x0d, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub date: Option<usize>,

    #[zvt_bmp(number = 0x0e, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub expiry_date: Option<usize>,

    #[zvt_bmp(number = 0x17, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub card_sequence_number: Option<usize>,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0x22, length = length::Llv, encoding = encoding::Bcd)]
    pub card_pan: Option<usize>,

    #[zvt_bmp(number = 0x23, length = length::Llv, encoding = encoding::Hex)]
    pub track_2_data: Option<String>,

    #[zvt_bmp(number = 0x27, length = length::Fixed<1>)]
    pub result_code: Option<u8>,

    #[zvt_bmp(number = 0x29)]
    pub timeout: Option<u8>,

    #[zvt_bmp(number = 0x2a, length = length::Lllv)]
    pub additional_text: Option<String>,

    #[zvt_bmp(number = 0x2e, length = length::Fixed<4>, encoding = encoding::Bcd)]
    pub terminal_id: Option<usize>,

    #[zvt_bmp(number = 0x3b, length = length::Fixed<8>)]
    pub auth_code: Option<String>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub receipt_no: Option<usize>,

    #[zvt_bmp(number = 0x8a)]
    pub card_type_id: Option<u8>,

    #[zvt_bmp(number = 0x8b, length = length::Llv)]
    pub card_name: Option<String>,
}

/// PT-to-ECR progress push during a transaction, chapter 3.7. The engine
/// turns `timeout` plus whatever free text a later TLV block carries into a
/// progress event and keeps waiting.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x04, instr = 0xff)]
pub struct IntermediateStatusInformation {
    pub status: u8,

    #[zvt_bmp(number = 0x29)]
    pub timeout: Option<u8>,
}

/// Chapter 2.55. The ECR polls the PT so time-controlled PT-side events
/// (end-of-day, OPT actions) fire punctually.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x05, instr = 0x01)]
pub struct StatusEnquiry {
    #[zvt_bmp(length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub password: Option<usize>,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,
}

/// Chapter 2.1. Configures the PT (print target, currency) and brings it
/// into service; sent once per session before any transaction.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x00)]
pub struct Registration {
    #[zvt_bmp(length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub password: usize,

    pub config_byte: u8,

    #[zvt_bmp(length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,
}

/// Chapter 2.2. A sale authorization.
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x01)]
pub struct Authorization {
    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0x0e, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub expiry_date: Option<usize>,

    #[zvt_bmp(number = 0x22, length = length::Llv, encoding = encoding::Bcd)]
    pub card_pan: Option<usize>,

    #[zvt_bmp(number = 0x23, length = length::Llv, encoding = encoding::Hex)]
    pub track_2_data: Option<String>,

    #[zvt_bmp(number = 0x01)]
    pub timeout: Option<u8>,

    #[zvt_bmp(number = 0x02)]
    pub maximum_no_of_status_info: Option<u8>,

    #[zvt_bmp(number = 0x2a, length = length::Lllv)]
    pub additional_text: Option<String>,

    #[zvt_bmp(number = 0x8a)]
    pub card_type_id: Option<u8>,
}

/// Reversal (void) of a completed sale, chapter 2.6 family — class/instr
/// `06/30`.
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x30)]
pub struct Reversal {
    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub receipt_no: Option<usize>,

    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,
}

/// Refund of a completed sale — class/instr `06/31`. Same response shape as
/// [Authorization].
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x31)]
pub struct Refund {
    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub receipt_no: Option<usize>,
}

/// Terminal transaction closure, chapter 2.1/2.2.9.
#[derive(Debug, Default, PartialEq, Eq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x0f)]
pub struct CompletionData {
    #[zvt_bmp(number = 0x27, length = length::Tlv)]
    pub result_code: Option<u8>,

    #[zvt_bmp(number = 0x19, length = length::Tlv)]
    pub status_byte: Option<u8>,

    #[zvt_bmp(number = 0x2e, length = length::Fixed<4>, encoding = encoding::Bcd)]
    pub terminal_id: Option<usize>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    /// PAN, present when the PT reports card data directly in the
    /// completion frame instead of (or in addition to) an earlier status
    /// push.
    #[zvt_bmp(number = 0x22, length = length::Tlv, encoding = encoding::Bcd)]
    pub card_pan: Option<usize>,

    #[zvt_bmp(number = 0x8a, length = length::Tlv)]
    pub card_type_id: Option<u8>,

    #[zvt_bmp(number = 0x3b, length = length::Tlv)]
    pub auth_code: Option<String>,
}

/// PT-printed receipt acknowledgement.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x0f)]
pub struct ReceiptPrintoutCompletion {
    #[zvt_bmp(length = length::Lllv, encoding = encoding::Utf8)]
    pub sw_version: String,

    pub terminal_status_code: u8,
}

/// Chapter 2.43. Causes the PT to restart.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x18)]
pub struct ResetTerminal {}

/// Chapter 2.44. Prints the PT's system configuration on its own printer.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x1a)]
pub struct PrintSystemConfiguration {}

/// Chapter 2.45. Set/reset the terminal identifier; only honored while the
/// turnover storage is empty (i.e. right after [EndOfDay]).
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x1b)]
pub struct SetTerminalId {
    #[zvt_bmp(length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub password: usize,

    #[zvt_bmp(number = 0x2e, length = length::Fixed<4>, encoding = encoding::Bcd)]
    pub terminal_id: Option<usize>,
}

/// PT-side abort of the in-flight transaction, chapter 2.2.9.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x1e)]
pub struct Abort {
    pub error: u8,
}

/// Abort variant emitted while a [Reservation] is pending, chapter 2.2.9.
/// The currency field is only present when `error == 0x6f`.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x1e)]
pub struct ReservationAbort {
    pub error: u8,

    #[zvt_bmp(length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,
}

/// Abort variant for a [PartialReversal] / [PreAuthReversal], chapter
/// 2.10.1. `error` is always [constants::ErrorMessages::ErrorPreAuthorization].
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x1e)]
pub struct PartialReversalAbort {
    pub error: u8,

    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = PartialReversalReceiptNo)]
    pub receipt_no: Option<usize>,
}

/// Pre-authorization / reservation, chapter 2.8 — class/instr `06/22`. The
/// ECR reserves a maximal payment amount ahead of the final sale total,
/// later released by [PartialReversal].
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x22)]
pub struct Reservation {
    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0x0e, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub expiry_date: Option<usize>,

    #[zvt_bmp(number = 0x22, length = length::Llv, encoding = encoding::Bcd)]
    pub card_pan: Option<usize>,

    #[zvt_bmp(number = 0x23, length = length::Llv, encoding = encoding::Hex)]
    pub track_2_data: Option<String>,

    #[zvt_bmp(number = 0x01)]
    pub timeout: Option<u8>,

    #[zvt_bmp(number = 0x02)]
    pub maximum_no_of_status_info: Option<u8>,

    #[zvt_bmp(number = 0x0b, length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub trace_number: Option<usize>,

    #[zvt_bmp(number = 0x3b, length = length::Fixed<8>)]
    pub auth_code: Option<String>,

    #[zvt_bmp(number = 0x2a, length = length::Lllv)]
    pub additional_text: Option<String>,

    #[zvt_bmp(number = 0x8a)]
    pub card_type_id: Option<u8>,
}

/// Encoding for the receipt-no field of [PartialReversalAbort] /
/// [PartialReversal]. May carry the sentinel `0xffff`, which isn't
/// representable as 2-byte packed BCD — chapter 2.10.1.
pub struct PartialReversalReceiptNo;

impl encoding::Encoding<usize> for PartialReversalReceiptNo {
    fn decode(bytes: &[u8]) -> peri_builder::ZVTResult<(usize, &[u8])> {
        if bytes.len() < 2 {
            return Err(peri_builder::ZVTError::IncompleteData);
        }
        if bytes[0..2] == [0xff, 0xff] {
            let tmp: u16 = encoding::Default::decode(&bytes[0..2])?.0;
            Ok((tmp as usize, &bytes[2..]))
        } else {
            Ok((encoding::Bcd::decode(&bytes[0..2])?.0, &bytes[2..]))
        }
    }

    fn encode(input: &usize) -> Vec<u8> {
        if *input == 0xffff {
            encoding::Default::encode(&(*input as u16))
        } else {
            encoding::Bcd::encode(input)
        }
    }
}

/// Releases the unused part of a [Reservation], chapter 2.10 — class/instr
/// `06/23`.
#[derive(Debug, Default, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x23)]
pub struct PartialReversal {
    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = PartialReversalReceiptNo)]
    pub receipt_no: Option<usize>,

    #[zvt_bmp(number = 0x04, length = length::Fixed<6>, encoding = encoding::Bcd)]
    pub amount: Option<usize>,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,
}

/// Reversal of a [Reservation] on a null-fill, chapter 2.14. Shares
/// [PartialReversal]'s response shape.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x25)]
pub struct PreAuthReversal {
    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0x49, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub currency: Option<usize>,

    #[zvt_bmp(number = 0x87, length = length::Fixed<2>, encoding = encoding::Bcd)]
    pub receipt_no: Option<usize>,
}

/// Settlement, chapter 2.16 — class/instr `06/50`. Transfers the stored
/// turnover to the host and closes the business day.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x50)]
pub struct EndOfDay {
    #[zvt_bmp(length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub password: usize,
}

/// Forces the PT to send a diagnostic message to the host, chapter 2.17.
#[derive(Debug, Default, PartialEq, Eq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x70)]
pub struct Diagnosis {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosisType {
    Line = 1,
    Extended = 2,
    Configuration = 3,
    EmvConfiguration = 4,
    Ep2Configuration = 5,
}

/// Forces the PT to send an [Initialization] sequence, chapter 2.18.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0x93)]
pub struct Initialization {
    #[zvt_bmp(length = length::Fixed<3>, encoding = encoding::Bcd)]
    pub password: usize,
}

/// Chapter 2.21. Asks the PT to read a chip/magnet card and report the card
/// data to the ECR.
#[derive(Debug, Default, PartialEq, Eq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0xc0)]
pub struct ReadCard {
    pub timeout_sec: u8,

    #[zvt_bmp(number = 0x19)]
    pub service_byte: Option<u8>,

    #[zvt_bmp(number = 0xfc)]
    pub dialog_control: Option<u8>,
}

/// Chapter 3.5. The PT prints one receipt line via the ECR's printer; text
/// has no embedded CR/LF, empty lines arrive as an empty text field. Only
/// sent when ECR-receipt printing is active (see [Registration]).
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0xd1)]
pub struct PrintLine {
    pub attribute: u8,

    pub text: String,
}

/// PT-driven block print, the multi-line counterpart to [PrintLine].
#[derive(Debug, Default, PartialEq, Eq, Zvt)]
#[zvt_control_field(class = 0x06, instr = 0xd3)]
pub struct PrintTextBlock {}

/// Chapter 2.36. Selects the PT's display/receipt language.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x08, instr = 0x30)]
pub struct SelectLanguage {
    language: u8,
}

/// Positive acknowledgement, `80/00`.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x80, instr = 0x00)]
pub struct Ack {}

/// Negative acknowledgement, `84/XX`. The first payload byte is the error
/// code — looked up in [constants::ErrorMessages] for the human-readable
/// message recorded on the transaction.
#[derive(Debug, PartialEq, Zvt)]
#[zvt_control_field(class = 0x84, instr = 0x00)]
pub struct Nack {
    pub error: u8,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::ZvtSerializer;

    #[test]
    fn authorization_round_trips() {
        let msg = Authorization {
            amount: Some(1234),
            currency: Some(978),
            card_type_id: Some(6),
            ..Authorization::default()
        };
        let bytes = msg.zvt_serialize();
        let (decoded, rest) = Authorization::zvt_deserialize(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn authorization_frame_starts_with_control_field_and_length() {
        let msg = Authorization {
            amount: Some(1234),
            ..Authorization::default()
        };
        let bytes = msg.zvt_serialize();
        assert_eq!(&bytes[0..2], &[0x06, 0x01]);
    }

    #[test]
    fn completion_data_round_trips() {
        let msg = CompletionData {
            result_code: Some(0),
            status_byte: Some(0),
            terminal_id: Some(52523535),
            currency: Some(978),
            card_pan: None,
            card_type_id: None,
            auth_code: None,
        };
        let bytes = msg.zvt_serialize();
        let (decoded, rest) = CompletionData::zvt_deserialize(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn completion_data_round_trips_with_card_data() {
        let msg = CompletionData {
            result_code: Some(0),
            status_byte: None,
            terminal_id: None,
            currency: None,
            card_pan: Some(1234),
            card_type_id: Some(0x02),
            auth_code: Some("123456".to_string()),
        };
        let bytes = msg.zvt_serialize();
        let (decoded, rest) = CompletionData::zvt_deserialize(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn completion_data_decodes_card_data_from_the_wire() {
        // class/instr/length, then result_code(0x27,approved)
        // card_pan(0x22, bcd "1234"), card_type_id(0x8a, 0x02=visa),
        // auth_code(0x3b, ascii "123456") - each as tag/len/value.
        let payload = [
            0x27, 0x01, 0x00, 0x22, 0x02, 0x12, 0x34, 0x8a, 0x01, 0x02, 0x3b, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36,
        ];
        let mut bytes = vec![0x06, 0x0f, payload.len() as u8];
        bytes.extend_from_slice(&payload);

        let (decoded, rest) = CompletionData::zvt_deserialize(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.result_code, Some(0x00));
        assert_eq!(decoded.card_pan, Some(1234));
        assert_eq!(decoded.card_type_id, Some(0x02));
        assert_eq!(decoded.auth_code.as_deref(), Some("123456"));
    }

    #[test]
    fn partial_reversal_receipt_no_handles_sentinel() {
        let bytes = PartialReversalReceiptNo::encode(&0xffff);
        assert_eq!(bytes, vec![0xff, 0xff]);
        let (value, rest) = PartialReversalReceiptNo::decode(&bytes).unwrap();
        assert_eq!(value, 0xffff);
        assert!(rest.is_empty());

        let bytes = PartialReversalReceiptNo::encode(&231);
        let (value, _) = PartialReversalReceiptNo::decode(&bytes).unwrap();
        assert_eq!(value, 231);
    }

    #[test]
    fn reversal_and_refund_carry_receipt_reference() {
        let reversal = Reversal {
            receipt_no: Some(42),
            amount: Some(500),
            currency: Some(978),
        };
        let bytes = reversal.zvt_serialize();
        assert_eq!(&bytes[0..2], &[0x06, 0x30]);
        let (decoded, _) = Reversal::zvt_deserialize(&bytes).unwrap();
        assert_eq!(decoded, reversal);

        let refund = Refund {
            amount: Some(500),
            currency: Some(978),
            receipt_no: Some(42),
        };
        assert_eq!(&refund.zvt_serialize()[0..2], &[0x06, 0x31]);
    }

    #[test]
    fn nack_extracts_error_byte() {
        let nack = Nack { error: 0x6c };
        let bytes = nack.zvt_serialize();
        let (decoded, _) = Nack::zvt_deserialize(&bytes).unwrap();
        assert_eq!(decoded.error, 0x6c);
    }
}
