//! Luhn 校验

/// 订单号最大长度，与表结构一致
pub const MAX_NUMBER_LEN: usize = 64;

/// 是否为非空纯数字串
pub fn is_digits(number: &str) -> bool {
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
}

/// 校验订单号：纯数字、长度受限且通过 Luhn 校验和
pub fn is_valid(number: &str) -> bool {
    if !is_digits(number) || number.len() > MAX_NUMBER_LEN {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
