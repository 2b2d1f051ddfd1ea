use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

/// Output formats accepted by the image conversion endpoint.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TargetFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
    Tiff,
    Bmp,
}

impl TargetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Tiff => "tiff",
            TargetFormat::Bmp => "bmp",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "webp" => Ok(TargetFormat::Webp),
            "tiff" => Ok(TargetFormat::Tiff),
            "bmp" => Ok(TargetFormat::Bmp),
            other => Err(format!("unsupported format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("WEBP".parse::<TargetFormat>(), Ok(TargetFormat::Webp));
        assert_eq!("jpg".parse::<TargetFormat>(), Ok(TargetFormat::Jpeg));
        assert!("gifv".parse::<TargetFormat>().is_err());
        assert_eq!(TargetFormat::Tiff.to_string(), "tiff");
    }
}
