//! Banque de sons par défaut du renderer
//!
//! Le décodage de fichiers est hors périmètre du nœud : le renderer
//! embarque une banque de 16 tonalités synthétisées au sample rate du
//! périphérique (gamme pentatonique mineure, attaque percussive à
//! décroissance exponentielle).

use pmomixer::SamplePcm;

/// Degrés de la pentatonique mineure
const PENTATONIC_STEPS: [u32; 5] = [0, 3, 5, 7, 10];

/// Fréquence du pad 0 (La 220 Hz)
const BASE_FREQ: f32 = 220.0;

/// Génère les 16 sons de pads, prêts à charger dans le mixeur
pub fn tone_bank(sample_rate: u32) -> Vec<(String, SamplePcm)> {
    (0u32..16)
        .map(|pad| {
            let octave = pad / 5;
            let step = PENTATONIC_STEPS[(pad % 5) as usize];
            let semitones = (octave * 12 + step) as f32;
            let freq = BASE_FREQ * (semitones / 12.0).exp2();
            (format!("tone-{pad}"), decaying_sine(sample_rate, freq))
        })
        .collect()
}

/// Sinus amorti de 400 ms, style "pluck"
fn decaying_sine(sample_rate: u32, freq: f32) -> SamplePcm {
    let rate = sample_rate.max(1) as f32;
    let frames = (rate * 0.4) as usize;
    let decay_frames = rate * 0.12;

    let samples = (0..frames)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * freq * n as f32 / rate;
            phase.sin() * (-(n as f32) / decay_frames).exp() * 0.6
        })
        .collect();

    SamplePcm::mono(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_has_sixteen_distinct_sounds() {
        let bank = tone_bank(48_000);
        assert_eq!(bank.len(), 16);

        let ids: std::collections::HashSet<_> = bank.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn test_tones_are_bounded_and_decaying() {
        for (_, pcm) in tone_bank(48_000) {
            assert_eq!(pcm.len(), 19_200); // 400 ms à 48 kHz
            assert!(pcm.left().iter().all(|sample| sample.abs() <= 0.6));
            // La fin est quasi silencieuse (plus de 3 constantes de temps)
            assert!(pcm.left()[pcm.len() - 1].abs() < 0.05);
        }
    }
}
