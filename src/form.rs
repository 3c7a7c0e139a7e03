//! `application/x-www-form-urlencoded` request bodies.

use url::form_urlencoded::byte_serialize;

use crate::{Charset, Error};

/// Render a value in its canonical, locale-independent form.
///
/// This is the representation posted to other machines: numbers use `.` as
/// decimal separator and no grouping, absent values are empty.
pub trait MachineString {
    /// The machine readable string of the value.
    fn to_machine_string(&self) -> String;
}

impl MachineString for str {
    fn to_machine_string(&self) -> String {
        self.to_owned()
    }
}

impl MachineString for String {
    fn to_machine_string(&self) -> String {
        self.clone()
    }
}

impl<T: MachineString + ?Sized> MachineString for &T {
    fn to_machine_string(&self) -> String {
        (**self).to_machine_string()
    }
}

impl<T: MachineString> MachineString for Option<T> {
    fn to_machine_string(&self) -> String {
        match self {
            Some(v) => v.to_machine_string(),
            None => String::new(),
        }
    }
}

macro_rules! machine_string_display {
    ($($t:ty),*) => {
        $(
            impl MachineString for $t {
                fn to_machine_string(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

machine_string_display!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64
);

/// Encode parameters as a form body.
///
/// Each pair becomes `key=value`, pairs are joined with `&` in iteration order.
/// Keys and values are converted to bytes in `charset` and then
/// percent-encoded, with space as `+`.
pub fn encode_form<I, K, V>(params: I, charset: Charset) -> Result<String, Error>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: MachineString,
{
    let mut out = String::new();
    let mut first = true;

    for (key, value) in params {
        if !first {
            out.push('&');
        }
        first = false;

        out.extend(byte_serialize(&charset.encode(key.as_ref())?));
        out.push('=');
        out.extend(byte_serialize(&charset.encode(&value.to_machine_string())?));
    }

    Ok(out)
}
