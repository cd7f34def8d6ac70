use yle_core::model::{AccessibilityFeature, BrowserKind, DeviceClass, SessionMetadata};

/// Describes the device a session is taken on.
///
/// The front end fills this in from whatever it knows (a browser user agent,
/// OS accessibility settings); [`EnvironmentProbe::metadata`] turns it into the
/// descriptive `SessionMetadata` stored on the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentProbe {
    user_agent: String,
    prefers_high_contrast: bool,
    prefers_reduced_motion: bool,
}

impl EnvironmentProbe {
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_high_contrast(mut self, enabled: bool) -> Self {
        self.prefers_high_contrast = enabled;
        self
    }

    #[must_use]
    pub fn with_reduced_motion(mut self, enabled: bool) -> Self {
        self.prefers_reduced_motion = enabled;
        self
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn device_class(&self) -> DeviceClass {
        let ua = self.user_agent.as_str();
        if ["Mobile", "Android", "iPhone", "iPad"]
            .iter()
            .any(|needle| ua.contains(needle))
        {
            DeviceClass::Mobile
        } else if ua.contains("Tablet") {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }

    /// Edge advertises Chrome too, so it is checked first.
    #[must_use]
    pub fn browser(&self) -> BrowserKind {
        let ua = self.user_agent.as_str();
        if ua.contains("Edg") {
            BrowserKind::Edge
        } else if ua.contains("Chrome") {
            BrowserKind::Chrome
        } else if ua.contains("Firefox") {
            BrowserKind::Firefox
        } else if ua.contains("Safari") {
            BrowserKind::Safari
        } else {
            BrowserKind::Unknown
        }
    }

    #[must_use]
    pub fn accessibility_features(&self) -> Vec<AccessibilityFeature> {
        let mut features = Vec::new();
        if self.prefers_high_contrast {
            features.push(AccessibilityFeature::HighContrast);
        }
        if self.prefers_reduced_motion {
            features.push(AccessibilityFeature::ReducedMotion);
        }
        if self.user_agent.contains("NVDA") || self.user_agent.contains("JAWS") {
            features.push(AccessibilityFeature::ScreenReader);
        }
        features
    }

    #[must_use]
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            device_info: Some(self.device_class()),
            browser_info: Some(self.browser()),
            accessibility_features: self.accessibility_features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/126.0 Mobile Safari/537.36";
    const EDGE_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/126.0 Safari/537.36 Edg/126.0";
    const FIREFOX_DESKTOP: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

    #[test]
    fn detects_mobile_chrome() {
        let probe = EnvironmentProbe::new(CHROME_ANDROID);
        assert_eq!(probe.device_class(), DeviceClass::Mobile);
        assert_eq!(probe.browser(), BrowserKind::Chrome);
    }

    #[test]
    fn edge_wins_over_chrome() {
        let probe = EnvironmentProbe::new(EDGE_DESKTOP);
        assert_eq!(probe.device_class(), DeviceClass::Desktop);
        assert_eq!(probe.browser(), BrowserKind::Edge);
    }

    #[test]
    fn collects_accessibility_preferences() {
        let probe = EnvironmentProbe::new(format!("{FIREFOX_DESKTOP} NVDA/2024.1"))
            .with_high_contrast(true)
            .with_reduced_motion(true);
        let meta = probe.metadata();
        assert_eq!(meta.browser_info, Some(BrowserKind::Firefox));
        assert_eq!(
            meta.accessibility_features,
            vec![
                AccessibilityFeature::HighContrast,
                AccessibilityFeature::ReducedMotion,
                AccessibilityFeature::ScreenReader,
            ]
        );
    }

    #[test]
    fn empty_agent_is_unknown_desktop() {
        let meta = EnvironmentProbe::default().metadata();
        assert_eq!(meta.device_info, Some(DeviceClass::Desktop));
        assert_eq!(meta.browser_info, Some(BrowserKind::Unknown));
        assert!(meta.accessibility_features.is_empty());
    }
}
